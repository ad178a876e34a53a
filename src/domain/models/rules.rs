use serde::{Deserialize, Serialize};

use super::violation::SeverityTier;

/// Declarative rule document for one agent.
///
/// ```yaml
/// agent_id: trader-7
/// rules:
///   - name: margin_floor
///     type: financial
///     rule: "margin >= 0.2"
///     tolerance: 0.05
///     severity: critical
///   - name: kyc_check
///     type: webhook
///     url: https://compliance.internal/kyc
///     timeout_ms: 80
///     fields: [proposed_loss]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDocument {
    pub agent_id: String,
    #[serde(default)]
    pub rules: Vec<RuleSpec>,
}

impl RuleDocument {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }
}

/// Kind of a declared rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleType {
    Physical,
    Financial,
    Webhook,
}

impl RuleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Physical => "physical",
            Self::Financial => "financial",
            Self::Webhook => "webhook",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    #[default]
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

/// One entry of a rule document, before compilation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub name: String,

    #[serde(rename = "type")]
    pub rule_type: RuleType,

    /// Comparison expression (physical/financial rules).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,

    /// Relative relaxation of the limit.
    #[serde(default)]
    pub tolerance: f64,

    /// Declared tier; acts as a floor on the computed one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<SeverityTier>,

    /// Endpoint of a webhook rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default)]
    pub method: HttpMethod,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// Advisory rules never fail closed on transport errors.
    #[serde(default)]
    pub advisory: bool,

    /// Request fields forwarded to a webhook.
    #[serde(default)]
    pub fields: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_document() {
        let yaml = r#"
agent_id: trader-7
rules:
  - name: margin_floor
    type: financial
    rule: "margin >= 0.2"
    tolerance: 0.05
    severity: critical
  - name: kyc_check
    type: webhook
    url: http://localhost/kyc
    method: GET
    timeout_ms: 80
    advisory: true
    fields: [proposed_loss]
"#;
        let doc = RuleDocument::from_yaml_str(yaml).unwrap();
        assert_eq!(doc.agent_id, "trader-7");
        assert_eq!(doc.rules.len(), 2);

        let margin = &doc.rules[0];
        assert_eq!(margin.rule_type, RuleType::Financial);
        assert_eq!(margin.severity, Some(SeverityTier::Critical));
        assert_eq!(margin.method, HttpMethod::Post);

        let kyc = &doc.rules[1];
        assert_eq!(kyc.rule_type, RuleType::Webhook);
        assert_eq!(kyc.method, HttpMethod::Get);
        assert_eq!(kyc.timeout_ms, Some(80));
        assert!(kyc.advisory);
        assert_eq!(kyc.fields, vec!["proposed_loss".to_string()]);
    }

    #[test]
    fn test_unknown_type_rejected() {
        let yaml = "agent_id: a\nrules:\n  - name: x\n    type: chemical\n";
        assert!(RuleDocument::from_yaml_str(yaml).is_err());
    }
}
