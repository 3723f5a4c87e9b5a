//! Location of the extension archives shipped with the browser.

use std::path::{Path, PathBuf};

/// Directory name the packaging step writes bundled archives into.
pub const BUNDLED_DIR_NAME: &str = "browseros_extensions";

/// Resolve the bundled extension directory.
///
/// An explicit override wins. Otherwise the directory sits next to the
/// browser executable, except on macOS where it lives in the app bundle's
/// `Resources`.
pub fn resolve_bundled_dir(override_dir: Option<&Path>) -> Option<PathBuf> {
    if let Some(dir) = override_dir {
        return Some(dir.to_path_buf());
    }
    let exe = std::env::current_exe().ok()?;
    bundled_dir_for_executable(&exe)
}

#[cfg(target_os = "macos")]
fn bundled_dir_for_executable(exe: &Path) -> Option<PathBuf> {
    // <App>.app/Contents/MacOS/<binary> -> <App>.app/Contents/Resources
    let contents = exe.parent()?.parent()?;
    Some(contents.join("Resources").join(BUNDLED_DIR_NAME))
}

#[cfg(not(target_os = "macos"))]
fn bundled_dir_for_executable(exe: &Path) -> Option<PathBuf> {
    Some(exe.parent()?.join(BUNDLED_DIR_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_is_returned_verbatim() {
        let dir = Path::new("/opt/browseros/custom");
        assert_eq!(resolve_bundled_dir(Some(dir)), Some(dir.to_path_buf()));
    }

    #[cfg(not(target_os = "macos"))]
    #[test]
    fn sits_next_to_executable() {
        let dir = bundled_dir_for_executable(Path::new("/opt/browseros/chrome"));
        assert_eq!(dir, Some(PathBuf::from("/opt/browseros/browseros_extensions")));
    }

    #[cfg(target_os = "macos")]
    #[test]
    fn lives_in_app_resources() {
        let dir = bundled_dir_for_executable(Path::new(
            "/Applications/BrowserOS.app/Contents/MacOS/BrowserOS",
        ));
        assert_eq!(
            dir,
            Some(PathBuf::from(
                "/Applications/BrowserOS.app/Contents/Resources/browseros_extensions"
            ))
        );
    }
}
