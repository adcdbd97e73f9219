use purchases_result::{create_error, Result};
use urlencoding::encode;

/// Make an app user id safe to use as a path segment
pub fn escape_identifier(identifier: &str) -> Result<String> {
    let trimmed = identifier.trim();
    if trimmed.is_empty() {
        return Err(create_error!(MissingAppUserId));
    }

    Ok(encode(trimmed).into_owned())
}
