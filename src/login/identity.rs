//! Identity extraction from the user-info payload.
//!
//! The user-info endpoint answers with one of several distinct `data`
//! shapes depending on account state and service version. The cascade
//! below reproduces the observed behavior exactly: the predicates are
//! evaluated top to bottom and the first match wins, so reordering them
//! changes which accounts log in. Keep the order.

use serde_json::Value;

use super::error::LoginError;
use super::event::UserIdentity;

/// Classifies the user-info `data` object into `(uid, name, avatar)`.
///
/// # Errors
///
/// Returns [`LoginError::Auth`] when the service reports the session as not
/// logged in (without the confirm-password escape hatch), and
/// [`LoginError::Structure`] when the payload matches none of the known
/// shapes.
pub fn extract_identity(data: &Value) -> Result<UserIdentity, LoginError> {
    let uid = data.get("uid").and_then(Value::as_str);
    let info = data.get("info");
    let name = info
        .and_then(|info| info.get("name"))
        .and_then(Value::as_str);
    let avatar = info
        .and_then(|info| info.get("avatar"))
        .and_then(Value::as_str);
    let logged = data.get("logged").and_then(Value::as_bool);
    let require_confirm_pwd = data
        .get("require_confirm_pwd")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    // Full identity: uid plus both info fields.
    if let (Some(uid), Some(name), Some(avatar)) = (uid, name, avatar) {
        return Ok(identity(uid, name, avatar));
    }
    // uid with an info object that lacks name/avatar.
    if let (Some(uid), Some(_)) = (uid, info) {
        return Ok(identity(uid, "", ""));
    }
    // info fields without a uid.
    if let (Some(name), Some(avatar)) = (name, avatar) {
        return Ok(identity("", name, avatar));
    }
    // A bare info object.
    if info.is_some() {
        return Ok(identity("", "", ""));
    }
    // No info object; the logged flag stands in for it.
    if logged == Some(true) {
        return Ok(identity(uid.unwrap_or_default(), "", ""));
    }
    if logged == Some(false) {
        // Accounts pending a password confirmation still count as logged
        // in for session export purposes; the service resolves the
        // confirmation out of band.
        if require_confirm_pwd {
            return Ok(identity(uid.unwrap_or_default(), "", ""));
        }
        return Err(LoginError::auth(
            "service reports the session is not logged in",
        ));
    }

    Err(LoginError::structure(
        "user-info data matches no known shape",
    ))
}

fn identity(uid: &str, name: &str, avatar: &str) -> UserIdentity {
    UserIdentity {
        uid: uid.to_string(),
        name: name.to_string(),
        avatar: avatar.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn extract(data: serde_json::Value) -> Result<UserIdentity, LoginError> {
        extract_identity(&data)
    }

    #[test]
    fn test_uid_with_full_info() {
        let user = extract(json!({
            "uid": "1001",
            "info": {"name": "Alice", "avatar": "https://cdn/a.png"}
        }))
        .unwrap();
        assert_eq!(user.uid, "1001");
        assert_eq!(user.name, "Alice");
        assert_eq!(user.avatar, "https://cdn/a.png");
    }

    #[test]
    fn test_uid_with_info_missing_fields_falls_back_to_empty() {
        let user = extract(json!({"uid": "1001", "info": {"other": 1}})).unwrap();
        assert_eq!(user.uid, "1001");
        assert_eq!(user.name, "");
        assert_eq!(user.avatar, "");
    }

    #[test]
    fn test_info_without_uid() {
        let user = extract(json!({
            "info": {"name": "Alice", "avatar": "https://cdn/a.png"}
        }))
        .unwrap();
        assert_eq!(user.uid, "");
        assert_eq!(user.name, "Alice");
        assert_eq!(user.avatar, "https://cdn/a.png");
    }

    #[test]
    fn test_bare_info_object() {
        let user = extract(json!({"info": {}})).unwrap();
        assert_eq!(user, UserIdentity::default());
    }

    #[test]
    fn test_uid_with_logged_true_and_no_info() {
        let user = extract(json!({"uid": "1001", "logged": true})).unwrap();
        assert_eq!(user.uid, "1001");
        assert_eq!(user.name, "");
        assert_eq!(user.avatar, "");
    }

    #[test]
    fn test_logged_true_alone() {
        let user = extract(json!({"logged": true})).unwrap();
        assert_eq!(user, UserIdentity::default());
    }

    #[test]
    fn test_logged_false_with_confirm_pwd_is_lenient() {
        let user = extract(json!({
            "logged": false,
            "require_confirm_pwd": true,
            "uid": "1001"
        }))
        .unwrap();
        assert_eq!(user.uid, "1001");

        let user = extract(json!({"logged": false, "require_confirm_pwd": true})).unwrap();
        assert_eq!(user.uid, "");
    }

    #[test]
    fn test_logged_false_without_confirm_pwd_is_fatal() {
        let result = extract(json!({"logged": false}));
        assert!(matches!(result, Err(LoginError::Auth { .. })));
    }

    #[test]
    fn test_unknown_shape_is_structural_error() {
        let result = extract(json!({"unrelated": 42}));
        assert!(matches!(result, Err(LoginError::Structure { .. })));
    }

    #[test]
    fn test_full_info_wins_over_logged_false() {
        // Precedence: the full-identity shape is checked before the logged
        // flag, so a contradictory payload still logs in.
        let user = extract(json!({
            "uid": "1001",
            "info": {"name": "Alice", "avatar": "a.png"},
            "logged": false
        }))
        .unwrap();
        assert_eq!(user.name, "Alice");
    }

    #[test]
    fn test_non_string_uid_is_ignored() {
        let result = extract(json!({"uid": 1001}));
        assert!(matches!(result, Err(LoginError::Structure { .. })));
    }
}
