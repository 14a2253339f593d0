//! Input checks shared by registration and login.

/// Minimum accepted password length, in characters.
pub const MIN_PASSWORD_LEN: usize = 6;

/// Validates email address format.
///
/// Accepts `local@domain.tld` where the local part uses letters, digits and
/// `._%+-`, the domain uses letters, digits, `.` and `-`, and the top-level
/// label is at least two ASCII letters.
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };

    let local_ok = !local.is_empty()
        && local
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "._%+-".contains(c));
    if !local_ok {
        return false;
    }

    let Some((host, tld)) = domain.rsplit_once('.') else {
        return false;
    };

    !host.is_empty()
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
        && tld.len() >= 2
        && tld.chars().all(|c| c.is_ascii_alphabetic())
}

/// Returns true if the password meets the minimum length.
pub fn is_valid_password(password: &str) -> bool {
    password.chars().count() >= MIN_PASSWORD_LEN
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_emails() {
        assert!(is_valid_email("user@example.com"));
        assert!(is_valid_email("first.last+tag@sub.example.co"));
        assert!(is_valid_email("a_b%c-d@my-host.io"));
    }

    #[test]
    fn test_invalid_emails() {
        assert!(!is_valid_email("invalid"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("user@"));
        assert!(!is_valid_email("user@example"));
        assert!(!is_valid_email("user@example.c"));
        assert!(!is_valid_email("user@example.c0m"));
        assert!(!is_valid_email("us er@example.com"));
        assert!(!is_valid_email("a@b@example.com"));
    }

    #[test]
    fn test_password_length() {
        assert!(is_valid_password("abcdef"));
        assert!(!is_valid_password("abcde"));
    }
}
