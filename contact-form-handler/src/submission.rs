use serde::Serialize;
use serde_json::{Map, Value};

pub const DEFAULT_SUBJECT: &str = "Website contact";

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// Content-type independent view of a contact form submission.
///
/// Every field is always present; fields missing from the request are empty.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CanonicalFields {
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
    pub honeypot: String,
    pub token: String,
}

impl Default for CanonicalFields {
    fn default() -> Self {
        Self {
            name: String::new(),
            email: String::new(),
            subject: DEFAULT_SUBJECT.into(),
            message: String::new(),
            honeypot: String::new(),
            token: String::new(),
        }
    }
}

/// Request keys accepted for the anti-spam trap and the captcha token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldAliases {
    pub honeypot: Vec<String>,
    pub token: Vec<String>,
}

impl Default for FieldAliases {
    fn default() -> Self {
        Self {
            honeypot: vec!["company".into()],
            token: vec![
                "token".into(),
                "ts_token".into(),
                "cf-turnstile-response".into(),
            ],
        }
    }
}

/// Extracts [`CanonicalFields`] from a request body.
///
/// Bodies which cannot be decoded are not an error: they produce the empty submission, which
/// validation then rejects for missing fields.
pub fn normalize(content_type: &str, body: &str, aliases: &FieldAliases) -> CanonicalFields {
    if content_type.contains(FORM_URLENCODED) {
        match serde_urlencoded::from_str::<Vec<(String, String)>>(body) {
            Ok(pairs) => {
                let lookup = |key: &str| {
                    pairs
                        .iter()
                        .find(|(name, _)| name == key)
                        .map(|(_, value)| value.clone())
                };
                extract(&lookup, &lookup, aliases)
            }
            Err(_) => CanonicalFields::default(),
        }
    } else {
        match serde_json::from_str::<Value>(body) {
            Ok(Value::Object(object)) => extract(
                |key| json_field(&object, key),
                |key| json_trap_field(&object, key),
                aliases,
            ),
            _ => CanonicalFields::default(),
        }
    }
}

fn extract(
    lookup: impl Fn(&str) -> Option<String>,
    trap_lookup: impl Fn(&str) -> Option<String>,
    aliases: &FieldAliases,
) -> CanonicalFields {
    let trimmed = |value: Option<String>| {
        value
            .map(|value| value.trim().to_string())
            .unwrap_or_default()
    };
    let field = |key: &str| trimmed(lookup(key));
    let first_non_empty = |keys: &[String], lookup: &dyn Fn(&str) -> Option<String>| {
        keys.iter()
            .map(|key| trimmed(lookup(key)))
            .find(|value| !value.is_empty())
            .unwrap_or_default()
    };
    let subject = field("subject");
    CanonicalFields {
        name: field("name"),
        email: field("email"),
        subject: if subject.is_empty() {
            DEFAULT_SUBJECT.into()
        } else {
            subject
        },
        message: field("message"),
        honeypot: first_non_empty(&aliases.honeypot, &trap_lookup),
        token: first_non_empty(&aliases.token, &lookup),
    }
}

fn json_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    match object.get(key)? {
        Value::Null => None,
        Value::String(value) => Some(value.clone()),
        other => Some(other.to_string()),
    }
}

/// Like [`json_field`], but `false` and zero leave a honeypot empty, so a checkbox-style trap
/// serialized by a client script does not discard a genuine submission.
fn json_trap_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    match object.get(key)? {
        Value::Bool(false) => None,
        Value::Number(number) if number.as_f64() == Some(0.0) => None,
        _ => json_field(object, key),
    }
}

#[cfg(test)]
mod tests {
    use super::{normalize, CanonicalFields, FieldAliases, DEFAULT_SUBJECT};
    use googletest::prelude::*;

    const JSON: &str = "application/json";
    const FORM: &str = "application/x-www-form-urlencoded; charset=UTF-8";

    fn normalize_default(content_type: &str, body: &str) -> CanonicalFields {
        normalize(content_type, body, &FieldAliases::default())
    }

    #[test]
    fn reads_fields_from_json_body() -> Result<()> {
        let fields = normalize_default(
            JSON,
            r#"{"name":"Ada","email":"ada@example.com","subject":"Hello","message":"Hi there","token":"abc"}"#,
        );

        verify_that!(
            fields,
            eq(CanonicalFields {
                name: "Ada".into(),
                email: "ada@example.com".into(),
                subject: "Hello".into(),
                message: "Hi there".into(),
                honeypot: "".into(),
                token: "abc".into(),
            })
        )
    }

    #[test]
    fn reads_fields_from_form_body() -> Result<()> {
        let fields = normalize_default(
            FORM,
            "name=Ada+Lovelace&email=ada%40example.com&message=Line+one%0ALine+two&company=",
        );

        verify_that!(
            fields,
            matches_pattern!(CanonicalFields {
                name: eq("Ada Lovelace"),
                email: eq("ada@example.com"),
                subject: eq(DEFAULT_SUBJECT),
                message: eq("Line one\nLine two"),
                honeypot: eq(""),
            })
        )
    }

    #[test]
    fn uses_first_occurrence_of_repeated_form_key() -> Result<()> {
        let fields = normalize_default(FORM, "email=first%40example.com&email=second%40example.com");

        verify_that!(fields.email, eq("first@example.com"))
    }

    #[test]
    fn trims_every_field() -> Result<()> {
        let fields = normalize_default(
            JSON,
            r#"{"name":"  Ada ","email":" ada@example.com\n","subject":"  ","message":"\tHi  "}"#,
        );

        verify_that!(
            fields,
            matches_pattern!(CanonicalFields {
                name: eq("Ada"),
                email: eq("ada@example.com"),
                subject: eq(DEFAULT_SUBJECT),
                message: eq("Hi"),
            })
        )
    }

    #[test]
    fn coerces_non_string_json_values() -> Result<()> {
        let fields = normalize_default(
            JSON,
            r#"{"name":42,"email":null,"subject":true,"message":["a","b"]}"#,
        );

        verify_that!(
            fields,
            matches_pattern!(CanonicalFields {
                name: eq("42"),
                email: eq(""),
                subject: eq("true"),
                message: eq(r#"["a","b"]"#),
            })
        )
    }

    #[test]
    fn falls_back_to_empty_submission_on_malformed_json() -> Result<()> {
        for body in ["", "{", "not json", "[1, 2]", "\"a string\"", "null"] {
            verify_that!(normalize_default(JSON, body), eq(CanonicalFields::default()))?;
        }
        Ok(())
    }

    #[test]
    fn parses_unknown_content_type_as_json() -> Result<()> {
        let fields = normalize_default("", r#"{"email":"ada@example.com"}"#);

        verify_that!(fields.email, eq("ada@example.com"))
    }

    #[test]
    fn takes_token_from_first_non_empty_alias() -> Result<()> {
        let fields = normalize_default(FORM, "ts_token=&cf-turnstile-response=from-widget");

        verify_that!(fields.token, eq("from-widget"))
    }

    #[test]
    fn prefers_earlier_token_alias() -> Result<()> {
        let fields = normalize_default(
            JSON,
            r#"{"cf-turnstile-response":"later","token":"earlier"}"#,
        );

        verify_that!(fields.token, eq("earlier"))
    }

    #[test]
    fn reads_honeypot_from_configured_aliases() -> Result<()> {
        let aliases = FieldAliases {
            honeypot: vec!["company".into(), "organization".into()],
            ..FieldAliases::default()
        };

        let fields = normalize(FORM, "organization=Spam+Inc", &aliases);

        verify_that!(fields.honeypot, eq("Spam Inc"))
    }

    #[test]
    fn leaves_honeypot_empty_for_false_or_zero() -> Result<()> {
        for body in [r#"{"company":false}"#, r#"{"company":0}"#, r#"{"company":0.0}"#] {
            verify_that!(normalize_default(JSON, body).honeypot, eq(""))?;
        }
        verify_that!(
            normalize_default(JSON, r#"{"company":true}"#).honeypot,
            eq("true")
        )?;
        verify_that!(
            normalize_default(JSON, r#"{"company":1}"#).honeypot,
            eq("1")
        )
    }

    #[test]
    fn ignores_unconfigured_honeypot_alias() -> Result<()> {
        let fields = normalize_default(JSON, r#"{"organization":"Acme"}"#);

        verify_that!(fields.honeypot, eq(""))
    }

    #[test]
    fn form_encoding_round_trips() -> Result<()> {
        let aliases = FieldAliases::default();
        let samples = [
            CanonicalFields {
                name: "Ada Lovelace".into(),
                email: "ada@example.com".into(),
                subject: "Über & more = fun?".into(),
                message: "First paragraph\n\nSecond, with 100% effort".into(),
                honeypot: "".into(),
                token: "0.abc+/=".into(),
            },
            CanonicalFields {
                honeypot: "bot filled this".into(),
                ..CanonicalFields::default()
            },
        ];

        for fields in samples {
            let encoded = serde_urlencoded::to_string([
                ("name", &fields.name),
                ("email", &fields.email),
                ("subject", &fields.subject),
                ("message", &fields.message),
                (aliases.honeypot[0].as_str(), &fields.honeypot),
                (aliases.token[0].as_str(), &fields.token),
            ])
            .unwrap();

            verify_that!(normalize(FORM, &encoded, &aliases), eq(fields))?;
        }
        Ok(())
    }
}
