// streamtap-config/src/validation.rs
//! Custom validation functions for configuration.

use validator::ValidationError;

/// Validate that an interface name follows Linux naming conventions.
///
/// The empty name and `any` both select every interface.
pub fn validate_interface(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Ok(());
    }

    let re = regex::Regex::new("^[a-zA-Z0-9_.:-]+$")
        .map_err(|_| ValidationError::new("invalid_regex"))?;

    if name.len() <= 15 && re.is_match(name) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_interface"))
    }
}

/// Validate the publisher output: `stdout` or a file path.
pub fn validate_output(output: &str) -> Result<(), ValidationError> {
    if output.trim().is_empty() {
        return Err(ValidationError::new("empty_output"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interface_names() {
        assert!(validate_interface("").is_ok());
        assert!(validate_interface("any").is_ok());
        assert!(validate_interface("enp0s31f6").is_ok());
        assert!(validate_interface("eth0 ").is_err());
        assert!(validate_interface("a-very-long-interface-name").is_err());
    }

    #[test]
    fn output_must_not_be_blank() {
        assert!(validate_output("stdout").is_ok());
        assert!(validate_output("  ").is_err());
    }
}
