pub mod admin;
pub mod auth;
pub mod categories;
pub mod pages;
pub mod settings;
pub mod structure;
pub mod tags;
pub mod users;

use crate::error::AppError;

/// Trimmed value of a required string field.
pub(crate) fn required(field: &str, value: &str, max: usize) -> Result<String, AppError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::validation(
            field,
            format!("The {} field is required.", field.replace('_', " ")),
        ));
    }
    max_length(field, Some(value), max)?;
    Ok(value.to_string())
}

pub(crate) fn max_length(field: &str, value: Option<&str>, max: usize) -> Result<(), AppError> {
    match value {
        Some(v) if v.chars().count() > max => Err(AppError::validation(
            field,
            format!(
                "The {} field must not be greater than {} characters.",
                field.replace('_', " "),
                max
            ),
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_trims_and_rejects_blank() {
        assert_eq!(required("name", "  Docs ", 255).unwrap(), "Docs");
        match required("tag_color", "   ", 20) {
            Err(AppError::Validation { field, message }) => {
                assert_eq!(field, "tag_color");
                assert_eq!(message, "The tag color field is required.");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        assert!(max_length("tag", Some("ééééé"), 5).is_ok());
        assert!(max_length("tag", Some("éééééé"), 5).is_err());
        assert!(max_length("tag", None, 0).is_ok());
    }
}
