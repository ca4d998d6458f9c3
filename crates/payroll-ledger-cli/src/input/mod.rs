pub mod file;
pub mod stdin;

use serde::de::DeserializeOwned;

/// Load a request from `--input`, else from piped stdin.
///
/// Returns `None` when neither is present so the caller can fall back to flags.
pub fn read_request<T: DeserializeOwned>(
    input: Option<&str>,
) -> Result<Option<T>, Box<dyn std::error::Error>> {
    if let Some(path) = input {
        return Ok(Some(file::read_document(path)?));
    }
    stdin::read_stdin()
}
