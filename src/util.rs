//! Small utility helpers used across modules.

/// Content backend base URL, shared by the scene, detection, and progress clients.
pub fn backend_base_url() -> String {
  std::env::var("BACKEND_URL").unwrap_or_else(|_| "http://localhost:5000".into())
}

/// Join a base URL and a path without doubling or dropping the slash.
/// Backend content references arrive both as "/data/images/x.png" and bare names.
pub fn join_url(base: &str, path: &str) -> String {
  let base = base.trim_end_matches('/');
  let path = path.trim_start_matches('/');
  format!("{base}/{path}")
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge request/response payloads.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let mut cut = max;
  while !s.is_char_boundary(cut) {
    cut -= 1;
  }
  format!("{}… ({} bytes total)", &s[..cut], s.len())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn join_url_handles_slashes_either_way() {
    assert_eq!(join_url("http://localhost:5000", "/detect"), "http://localhost:5000/detect");
    assert_eq!(join_url("http://localhost:5000/", "detect"), "http://localhost:5000/detect");
    assert_eq!(join_url("http://localhost:5000/", "/sound/start_sound.mp3"), "http://localhost:5000/sound/start_sound.mp3");
  }

  #[test]
  fn truncation_respects_char_boundaries() {
    assert_eq!(trunc_for_log("short", 32), "short");
    // "ñ" is two bytes; a cut landing inside it backs up to the boundary.
    assert_eq!(trunc_for_log("la montaña nevada", 9), "la monta… (18 bytes total)");
    assert_eq!(trunc_for_log("la montaña nevada", 10), "la montañ… (18 bytes total)");
  }
}
