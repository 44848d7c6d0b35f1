//! RFC 9421–style message canonicalization.
//!
//! Builds the deterministic byte string that is signed and verified. The
//! component list and params are carried on the wire as a `Signature-Input`
//! style string; this module both formats and parses that string and
//! constructs the canonical base from a `CanonicalSource`.

use sage_crypto::hash::content_digest;

use crate::error::CanonicalizeError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DerivedComponent {
    Method,
    Path,
    Authority,
    Query,
    TargetUri,
    Status,
}

impl DerivedComponent {
    fn name(&self) -> &'static str {
        match self {
            DerivedComponent::Method => "@method",
            DerivedComponent::Path => "@path",
            DerivedComponent::Authority => "@authority",
            DerivedComponent::Query => "@query",
            DerivedComponent::TargetUri => "@target-uri",
            DerivedComponent::Status => "@status",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "@method" => DerivedComponent::Method,
            "@path" => DerivedComponent::Path,
            "@authority" => DerivedComponent::Authority,
            "@query" => DerivedComponent::Query,
            "@target-uri" => DerivedComponent::TargetUri,
            "@status" => DerivedComponent::Status,
            _ => return None,
        })
    }
}

/// One entry in the signer's declared component list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Component {
    Derived(DerivedComponent),
    Header(String),
    ContentDigest,
}

impl Component {
    pub fn name(&self) -> String {
        match self {
            Component::Derived(d) => d.name().to_string(),
            Component::Header(h) => h.to_lowercase(),
            Component::ContentDigest => "content-digest".to_string(),
        }
    }

    pub fn parse(s: &str) -> Self {
        if let Some(d) = DerivedComponent::parse(s) {
            Component::Derived(d)
        } else if s.eq_ignore_ascii_case("content-digest") {
            Component::ContentDigest
        } else {
            Component::Header(s.to_lowercase())
        }
    }
}

/// `@signature-params` values: `keyid`, `alg`, `created`, optional
/// `expires`, and `nonce`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureParams {
    pub keyid: String,
    pub alg: String,
    pub created: i64,
    pub expires: Option<i64>,
    pub nonce: String,
}

/// Supplies the values a `Component` resolves to. Implemented by whatever
/// structured message type the transport defines; the message layer
/// provides one for `SecureMessage`.
pub trait CanonicalSource {
    fn derived(&self, component: &DerivedComponent) -> Option<String>;
    /// All values for a header, in the order they were set. Multiple
    /// values are joined with `", "` per RFC 9421's field-combining rule.
    fn header_values(&self, name: &str) -> Vec<String>;
    fn body(&self) -> &[u8];
}

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn component_value(component: &Component, source: &dyn CanonicalSource) -> Result<String, CanonicalizeError> {
    match component {
        Component::Derived(d) => source
            .derived(d)
            .ok_or_else(|| CanonicalizeError::MissingComponent(d.name().to_string())),
        Component::Header(name) => {
            let values = source.header_values(name);
            if values.is_empty() {
                return Err(CanonicalizeError::MissingComponent(name.clone()));
            }
            Ok(values
                .iter()
                .map(|v| collapse_whitespace(v.trim()))
                .collect::<Vec<_>>()
                .join(", "))
        }
        Component::ContentDigest => Ok(content_digest(source.body())),
    }
}

fn signature_params_suffix(components: &[Component], params: &SignatureParams) -> String {
    let list = components
        .iter()
        .map(|c| format!("\"{}\"", c.name()))
        .collect::<Vec<_>>()
        .join(" ");
    let mut suffix = format!(
        ";keyid=\"{}\";alg=\"{}\";created={}",
        params.keyid, params.alg, params.created
    );
    if let Some(expires) = params.expires {
        suffix.push_str(&format!(";expires={}", expires));
    }
    suffix.push_str(&format!(";nonce=\"{}\"", params.nonce));
    format!("({}){}", list, suffix)
}

/// Build the canonical base: one line per declared component, followed by
/// the `@signature-params` trailer. This is the exact byte string signed
/// and verified; it is never logged.
pub fn build_canonical_base(
    components: &[Component],
    params: &SignatureParams,
    source: &dyn CanonicalSource,
) -> Result<Vec<u8>, CanonicalizeError> {
    let mut base = String::new();
    for component in components {
        let value = component_value(component, source)?;
        base.push_str(&format!("\"{}\": {}\n", component.name(), value));
    }
    base.push_str(&format!(
        "\"@signature-params\": {}",
        signature_params_suffix(components, params)
    ));
    Ok(base.into_bytes())
}

/// Format a `Signature-Input` header value: `sig1=(<components>);<params>`.
pub fn format_signature_input(components: &[Component], params: &SignatureParams) -> String {
    format!("sig1={}", signature_params_suffix(components, params))
}

/// Parse a `Signature-Input` header value back into its component list and
/// params.
pub fn parse_signature_input(input: &str) -> Result<(Vec<Component>, SignatureParams), CanonicalizeError> {
    let rest = input
        .strip_prefix("sig1=")
        .ok_or_else(|| CanonicalizeError::MalformedSignatureInput("missing sig1= label".into()))?;
    let close = rest
        .find(')')
        .ok_or_else(|| CanonicalizeError::MalformedSignatureInput("unterminated component list".into()))?;
    let (list_part, params_part) = rest.split_at(close + 1);
    let list_inner = list_part
        .strip_prefix('(')
        .ok_or_else(|| CanonicalizeError::MalformedSignatureInput("component list must start with (".into()))?
        .trim_end_matches(')');

    let components = list_inner
        .split_whitespace()
        .map(|tok| Component::parse(tok.trim_matches('"')))
        .collect::<Vec<_>>();

    let mut keyid = None;
    let mut alg = None;
    let mut created = None;
    let mut expires = None;
    let mut nonce = None;

    for field in params_part.trim_start_matches(';').split(';') {
        let field = field.trim();
        if field.is_empty() {
            continue;
        }
        let (key, value) = field
            .split_once('=')
            .ok_or_else(|| CanonicalizeError::MalformedSignatureInput(format!("malformed param: {field}")))?;
        let value = value.trim_matches('"');
        match key {
            "keyid" => keyid = Some(value.to_string()),
            "alg" => alg = Some(value.to_string()),
            "created" => {
                created = Some(
                    value
                        .parse::<i64>()
                        .map_err(|_| CanonicalizeError::MalformedSignatureInput("bad created".into()))?,
                )
            }
            "expires" => {
                expires = Some(
                    value
                        .parse::<i64>()
                        .map_err(|_| CanonicalizeError::MalformedSignatureInput("bad expires".into()))?,
                )
            }
            "nonce" => nonce = Some(value.to_string()),
            _ => {}
        }
    }

    let params = SignatureParams {
        keyid: keyid.ok_or_else(|| CanonicalizeError::MalformedSignatureInput("missing keyid".into()))?,
        alg: alg.ok_or_else(|| CanonicalizeError::MalformedSignatureInput("missing alg".into()))?,
        created: created.ok_or_else(|| CanonicalizeError::MalformedSignatureInput("missing created".into()))?,
        expires,
        nonce: nonce.ok_or_else(|| CanonicalizeError::MalformedSignatureInput("missing nonce".into()))?,
    };

    Ok((components, params))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct FixedSource {
        derived: HashMap<&'static str, String>,
        headers: HashMap<String, Vec<String>>,
        body: Vec<u8>,
    }

    impl CanonicalSource for FixedSource {
        fn derived(&self, component: &DerivedComponent) -> Option<String> {
            self.derived.get(component.name()).cloned()
        }
        fn header_values(&self, name: &str) -> Vec<String> {
            self.headers.get(name).cloned().unwrap_or_default()
        }
        fn body(&self) -> &[u8] {
            &self.body
        }
    }

    fn source() -> FixedSource {
        let mut derived = HashMap::new();
        derived.insert("@method", "POST".to_string());
        derived.insert("@path", "/agents/a/messages".to_string());
        let mut headers = HashMap::new();
        headers.insert("x-task-id".to_string(), vec!["t-1".to_string()]);
        FixedSource {
            derived,
            headers,
            body: b"hello".to_vec(),
        }
    }

    fn params() -> SignatureParams {
        SignatureParams {
            keyid: "k-1".to_string(),
            alg: "hmac-sha256".to_string(),
            created: 1000,
            expires: Some(1300),
            nonce: "n-1".to_string(),
        }
    }

    #[test]
    fn deterministic() {
        let components = vec![
            Component::Derived(DerivedComponent::Method),
            Component::Derived(DerivedComponent::Path),
            Component::Header("x-task-id".to_string()),
            Component::ContentDigest,
        ];
        let src = source();
        let p = params();
        let base1 = build_canonical_base(&components, &p, &src).unwrap();
        let base2 = build_canonical_base(&components, &p, &src).unwrap();
        assert_eq!(base1, base2);
    }

    #[test]
    fn roundtrips_through_signature_input() {
        let components = vec![Component::Derived(DerivedComponent::Method), Component::ContentDigest];
        let p = params();
        let formatted = format_signature_input(&components, &p);
        let (parsed_components, parsed_params) = parse_signature_input(&formatted).unwrap();
        assert_eq!(parsed_components, components);
        assert_eq!(parsed_params, p);
    }

    #[test]
    fn missing_component_errors() {
        let components = vec![Component::Header("x-missing".to_string())];
        let src = source();
        let p = params();
        assert!(build_canonical_base(&components, &p, &src).is_err());
    }

    #[test]
    fn unsigned_header_changes_do_not_affect_base() {
        let components = vec![Component::Derived(DerivedComponent::Method)];
        let mut src = source();
        let p = params();
        let base1 = build_canonical_base(&components, &p, &src).unwrap();
        src.headers.insert("x-unsigned".to_string(), vec!["anything".to_string()]);
        let base2 = build_canonical_base(&components, &p, &src).unwrap();
        assert_eq!(base1, base2);
    }
}
