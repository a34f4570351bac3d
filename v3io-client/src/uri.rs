//! Request URI assembly.

use url::Url;
use v3io_core::{Result, V3ioError};

/// Builds the absolute request URI from the cluster URL, container name,
/// raw query and object path.
///
/// The path is normalised (duplicate slashes collapsed, `.`/`..` resolved)
/// while a trailing slash on the object path is preserved; spaces in the
/// query are escaped as `%20`.
pub fn build_request_uri(
    base_url: &str,
    container_name: &str,
    query: &str,
    path: &str,
) -> Result<Url> {
    let mut uri = Url::parse(base_url).map_err(|e| {
        V3ioError::Transport(format!("failed to parse cluster endpoint URL {base_url}: {e}"))
    })?;

    let mut cleaned = clean_path(&format!("/{container_name}/{path}"));
    if path.ends_with('/') && !cleaned.ends_with('/') {
        cleaned.push('/');
    }
    uri.set_path(&cleaned);

    if query.is_empty() {
        uri.set_query(None);
    } else {
        uri.set_query(Some(&query.replace(' ', "%20")));
    }

    Ok(uri)
}

/// Lexically normalises a slash-separated path rooted at `/`.
fn clean_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    let mut cleaned = String::with_capacity(path.len());
    cleaned.push('/');
    cleaned.push_str(&segments.join("/"));
    cleaned
}
