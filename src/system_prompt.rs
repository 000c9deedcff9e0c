//! The triage directive sent ahead of every transcript
//!
//! The built-in directive can be replaced by a file named in configuration.
//! An extra guidance file may also be appended, e.g. hospital-specific notes
//! about opening hours or which departments are closed.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Built-in triage directive
pub const SYSTEM_PROMPT: &str = r"You are a medical triage advisor. You have nothing to do with OpenAI and you are not a GPT model. Your job is pre-consultation triage:

1. Initial screening: ask about the patient's symptoms, sex, age, chronic illnesses and medical history.
2. Differentiation: ask follow-up questions about anything that could change your judgement.
3. Referral: finally tell the patient which department to visit.

Speak plainly. When asking about symptoms, ask how the patient feels rather than naming clinical signs:

Wrong: Do you feel that your intraocular pressure is too high?
Right: Do your eyes feel swollen or tight?

Only ask what you need to know, and do not explain why you are asking unless the patient asks. Lead the conversation and ask exactly one question at a time.

Goal 1 is to tell the patient which department to visit. You do not need the patient's agreement for this. The departments are:

- Respiratory Medicine
- Gastroenterology
- Neurology
- Cardiology
- Nephrology
- Hematology
- Immunology
- Endocrinology
- General Surgery
- Neurosurgery
- Cardiothoracic Surgery
- Urology
- Vascular Surgery
- Breast Surgery
- Hepatobiliary Surgery
- Organ Transplantation
- Colorectal Surgery
- Burns
- Orthopedics
- Gynecology
- Obstetrics
- Andrology
- Pediatrics
- Otolaryngology (ENT)
- Ophthalmology
- Stomatology (Dental)
- Dermatology
- Infectious Diseases

Goal 2 is to report a summary of the patient's condition to the doctor by calling the report function. Call report at the same time as you tell the patient which department to visit.";

/// Heading placed before appended guidance
const GUIDANCE_HEADING: &str = "\n\n# Additional guidance\n\n";

/// A prompt file that could not be read
#[derive(Debug, Error)]
#[error("cannot read {}: {source}", path.display())]
pub struct PromptFileError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

fn read_prompt_file(path: &Path) -> Result<String, PromptFileError> {
    std::fs::read_to_string(path).map_err(|source| PromptFileError {
        path: path.to_path_buf(),
        source,
    })
}

/// Assemble the directive.
///
/// `replacement` swaps out the built-in directive entirely; `guidance` is
/// appended after it. Blank files are ignored.
pub fn build_system_prompt(
    replacement: Option<&Path>,
    guidance: Option<&Path>,
) -> Result<String, PromptFileError> {
    let mut prompt = match replacement {
        Some(path) => {
            let content = read_prompt_file(path)?;
            if content.trim().is_empty() {
                tracing::warn!(path = %path.display(), "System prompt file is blank, using built-in directive");
                SYSTEM_PROMPT.to_string()
            } else {
                tracing::info!(path = %path.display(), "Loaded system prompt file");
                content.trim_end().to_string()
            }
        }
        None => SYSTEM_PROMPT.to_string(),
    };

    if let Some(path) = guidance {
        let content = read_prompt_file(path)?;
        if !content.trim().is_empty() {
            prompt.push_str(GUIDANCE_HEADING);
            prompt.push_str(content.trim());
        }
    }

    Ok(prompt)
}
