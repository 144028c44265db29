//! Placeholder-safe round trip for external text transforms
//!
//! An augmentation strategy (paraphrase, back-translation) is a pure
//! string-to-string function supplied by the caller. It is applied to the
//! prompt region only, and three things must survive the trip verbatim:
//! quoted literal constants (`{{"world politics"}}`), the reference to the
//! dataset's primary text field, and the `|||` separator. The first two are
//! swapped out for opaque tokens before the transform runs and restored
//! afterward; the separator never enters the transform because the target
//! region is split off first.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{PromptStoreError, Result};
use crate::template::render::SEPARATOR;

lazy_static! {
    static ref QUOTED_CONSTANT_RE: Regex =
        Regex::new(r#"\{\{\s*(?:"[^"]*"|'[^']*')\s*\}\}"#).unwrap();
}

/// Tokens are uppercase alphanumerics so translation-style transforms pass
/// them through untouched.
const TEXT_FIELD_TOKEN: &str = "XTEXTFIELD0X";

fn constant_token(index: usize) -> String {
    format!("XCONST{}X", index)
}

/// Run a text transform over a template's prompt region, protecting quoted
/// constants and the primary text field interpolation.
///
/// The target region (everything after the separator) is reattached
/// untouched. Fails when the transform drops or mangles a protected token,
/// since the decorated text could then not be restored.
pub fn augment_prompt<F>(jinja: &str, text_fieldname: &str, transform: F) -> Result<String>
where
    F: Fn(&str) -> String,
{
    let (prompt, target) = match jinja.split_once(SEPARATOR) {
        Some((prompt, target)) => (prompt, Some(target)),
        None => (jinja, None),
    };

    // Decorate: constants first, then the text-field reference.
    let mut constants: Vec<String> = Vec::new();
    let decorated = QUOTED_CONSTANT_RE
        .replace_all(prompt, |capture: &regex::Captures| {
            let token = constant_token(constants.len());
            constants.push(capture[0].to_string());
            token
        })
        .into_owned();

    let text_field_re = Regex::new(&format!(
        r"\{{\{{\s*{}\s*\}}\}}",
        regex::escape(text_fieldname)
    ))
    .map_err(|e| PromptStoreError::validation(format!("invalid text field name: {}", e)))?;
    let had_text_field = text_field_re.is_match(&decorated);
    let decorated = text_field_re
        .replace_all(&decorated, TEXT_FIELD_TOKEN)
        .into_owned();

    let transformed = transform(&decorated);

    // Restore, verifying every token survived.
    if had_text_field && !transformed.contains(TEXT_FIELD_TOKEN) {
        return Err(PromptStoreError::validation(
            "text transform dropped the protected text-field placeholder",
        ));
    }
    let mut restored = transformed.replace(
        TEXT_FIELD_TOKEN,
        &format!("{{{{{}}}}}", text_fieldname),
    );
    for (index, constant) in constants.iter().enumerate() {
        let token = constant_token(index);
        if !restored.contains(&token) {
            return Err(PromptStoreError::validation(
                "text transform dropped a protected constant placeholder",
            ));
        }
        restored = restored.replace(&token, constant);
    }

    match target {
        Some(target) => Ok(format!("{}{}{}", restored, SEPARATOR, target)),
        None => Ok(restored),
    }
}
