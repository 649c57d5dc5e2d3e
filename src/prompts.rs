//! Prompts sent to the inference provider.
//!
//! The schema block in [`build_prompt`] is the only description of the
//! expected output the provider ever sees. It must name exactly the fields
//! and enumeration values that [`crate::pipeline::validate`] enforces; the
//! tests at the bottom of this file fail if the two drift apart.

/// System instruction for chat-style providers.
///
/// Sent as the first message so the model emits a bare JSON object. The
/// validator still tolerates prose around the object.
pub const SYSTEM_INSTRUCTION: &str = "You are a medical assistant. ONLY output valid JSON that matches the BloodAnalysisResult schema. Do not include explanations, markdown, or text outside the JSON object.";

/// JSON shape the provider is asked to return.
pub const RESULT_SCHEMA: &str = r#"{
  "bloodType": "string | optional",
  "keyFindings": "string[]",
  "supplements": [
    {
      "name": "string",
      "reason": "string",
      "dosage": "string | optional",
      "priority": "high | medium | low"
    }
  ],
  "healthStatus": "good | attention | concern",
  "summary": "string"
}"#;

/// Render extracted report text into the analysis prompt.
///
/// Pure and total: the same text always yields the same prompt, and the text
/// is appended verbatim after the schema.
pub fn build_prompt(extracted_text: &str) -> String {
    format!(
        "Analyze the following blood test results and return ONLY valid JSON.\n\n\
         JSON schema:\n{RESULT_SCHEMA}\n\n\
         Blood test data: {extracted_text}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{HealthStatus, Priority};

    #[test]
    fn text_is_appended_verbatim_at_the_end() {
        let text = "Hemoglobin 13.5 g/dL\n  WBC   7.2 \u{00d7}10^9/L ";
        let prompt = build_prompt(text);
        assert!(prompt.ends_with(text));
    }

    #[test]
    fn deterministic() {
        assert_eq!(build_prompt("abc"), build_prompt("abc"));
    }

    #[test]
    fn empty_text_still_renders_schema() {
        let prompt = build_prompt("");
        assert!(prompt.contains(RESULT_SCHEMA));
        assert!(prompt.ends_with("Blood test data: "));
    }

    #[test]
    fn schema_names_every_validated_field() {
        for field in [
            "\"bloodType\"",
            "\"keyFindings\"",
            "\"supplements\"",
            "\"name\"",
            "\"reason\"",
            "\"dosage\"",
            "\"priority\"",
            "\"healthStatus\"",
            "\"summary\"",
        ] {
            assert!(RESULT_SCHEMA.contains(field), "schema lacks {field}");
        }
    }

    #[test]
    fn schema_enumerations_match_output_types() {
        let priorities = Priority::ALLOWED.replace(", ", " | ");
        let statuses = HealthStatus::ALLOWED.replace(", ", " | ");
        assert!(RESULT_SCHEMA.contains(&priorities));
        assert!(RESULT_SCHEMA.contains(&statuses));
    }

    #[test]
    fn schema_is_valid_json() {
        serde_json::from_str::<serde_json::Value>(RESULT_SCHEMA).expect("schema parses");
    }
}
