use serde::Serialize;

/// Serialize a serde-backed enum into its string name (e.g. `auxHeatOnly`).
pub fn serde_enum_name<T: Serialize>(val: &T) -> Option<String> {
    serde_json::to_value(val).ok()?.as_str().map(|s| s.to_string())
}

/// Keeps the first four characters of a token for log correlation.
pub fn mask_secret(secret: &str) -> String {
    let prefix: String = secret.chars().take(4).collect();
    if prefix.chars().count() == secret.chars().count() {
        "****".to_string()
    } else {
        format!("{}****", prefix)
    }
}
