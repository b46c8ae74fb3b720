//! Structured-reply validation against the core contract.
//!
//! Validation collects *all* errors rather than stopping at the first, so a
//! single repair retry can hand the model the complete list of what to fix.

use serde_json::Value;

use fable_core::documents::CoreContract;

use crate::reply::Awf;

/// Validate a raw reply value against the contract's schema rules.
///
/// On success the value is re-shaped into an [`Awf`]. On failure every
/// violation found is returned; the caller builds a repair hint from them.
pub fn validate_reply(value: Option<&Value>, contract: &CoreContract) -> Result<Awf, Vec<String>> {
    let mut errors = Vec::new();

    let Some(value) = value else {
        return Err(vec!["reply carries no structured payload".to_owned()]);
    };
    let Some(map) = value.as_object() else {
        return Err(vec!["structured payload is not a JSON object".to_owned()]);
    };

    for key in &contract.required_keys {
        if !map.contains_key(key) {
            errors.push(format!("missing required key '{key}'"));
        }
    }
    for key in map.keys() {
        if !contract.required_keys.contains(key) && !contract.optional_keys.contains(key) {
            errors.push(format!("unexpected key '{key}'"));
        }
    }

    match map.get("txt") {
        Some(Value::String(txt)) if !txt.trim().is_empty() => {}
        Some(Value::String(_)) => errors.push("'txt' is empty".to_owned()),
        Some(_) => errors.push("'txt' is not a string".to_owned()),
        None => {}
    }

    match map.get("acts") {
        Some(Value::Array(_)) | None => {}
        Some(_) => errors.push("'acts' is not an array".to_owned()),
    }

    if let Some(choices) = map.get("choices") {
        match choices.as_array() {
            Some(entries) => {
                if entries.len() > contract.max_choices {
                    errors.push(format!(
                        "{} choices exceeds the limit of {}",
                        entries.len(),
                        contract.max_choices
                    ));
                }
                for (i, entry) in entries.iter().enumerate() {
                    let id_ok = entry.get("id").is_some_and(Value::is_string);
                    let label_ok = entry.get("label").is_some_and(Value::is_string);
                    if !id_ok || !label_ok {
                        errors.push(format!("choice {i} needs string 'id' and 'label'"));
                    }
                }
            }
            None => errors.push("'choices' is not an array".to_owned()),
        }
    }

    if let Some(scn) = map.get("scn") {
        if !scn.is_string() {
            errors.push("'scn' is not a string".to_owned());
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    serde_json::from_value::<Awf>(value.clone())
        .map_err(|e| vec![format!("reply did not re-shape cleanly: {e}")])
}

/// One-line repair hint built from validation errors, embedded in the repair
/// prompt.
#[must_use]
pub fn repair_hint(errors: &[String]) -> String {
    format!("Your previous reply was invalid: {}.", errors.join("; "))
}
