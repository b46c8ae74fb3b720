//! System prompt builders.
//!
//! Two variants: the base prompt for the initial attempt, and a repair
//! variant that prepends the validation errors from the failed attempt. The
//! repair prompt is a fresh system prompt, not an appended conversation turn.

use fable_core::documents::CoreContract;

use crate::validator::repair_hint;

/// Base system prompt for a turn.
#[must_use]
pub fn base_system_prompt(contract: &CoreContract) -> String {
    format!(
        "You are the narrator of a turn-based interactive story.\n\
         Reply with a single JSON object carrying exactly these keys: {required}\
         {optional}.\n\
         'txt' is the narration for this turn. 'acts' is an array of state \
         mutations drawn only from these types: {acts}.\n\
         Offer at most {max_choices} choices. Do not include anything outside \
         the JSON object.",
        required = contract.required_keys.join(", "),
        optional = if contract.optional_keys.is_empty() {
            String::new()
        } else {
            format!(" (optionally: {})", contract.optional_keys.join(", "))
        },
        acts = contract.allowed_acts.join(", "),
        max_choices = contract.max_choices,
    )
}

/// Repair-variant system prompt, built from the first attempt's validation
/// errors.
#[must_use]
pub fn repair_system_prompt(contract: &CoreContract, errors: &[String]) -> String {
    format!(
        "{hint}\n{base}",
        hint = repair_hint(errors),
        base = base_system_prompt(contract)
    )
}
