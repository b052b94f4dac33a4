use arboard::Clipboard;
use tracing::{debug, error};

/// Clipboard writer for transcription results.
///
/// Both operations return `false` on failure and never panic; losing a
/// clipboard write must not take the session down.
pub struct ClipboardSink;

impl ClipboardSink {
    /// Copy plain text under the platform's text flavor.
    pub fn copy_plain(text: &str) -> bool {
        match Clipboard::new() {
            Ok(mut clipboard) => match clipboard.set_text(text.to_string()) {
                Ok(()) => {
                    debug!("copied {} chars to clipboard", text.chars().count());
                    true
                }
                Err(e) => {
                    error!("clipboard write failed: {e}");
                    false
                }
            },
            Err(e) => {
                error!("clipboard unavailable: {e}");
                false
            }
        }
    }

    /// Copy HTML with a plain-text fallback. Both flavors are registered so
    /// targets without HTML support still receive the fallback text.
    pub fn copy_rich(html: &str, fallback_plain: &str) -> bool {
        let document = wrap_html_document(html);
        match Clipboard::new() {
            Ok(mut clipboard) => {
                match clipboard.set_html(document, Some(fallback_plain.to_string())) {
                    Ok(()) => {
                        debug!("copied rich payload to clipboard");
                        true
                    }
                    Err(e) => {
                        error!("rich clipboard write failed: {e}");
                        false
                    }
                }
            }
            Err(e) => {
                error!("clipboard unavailable: {e}");
                false
            }
        }
    }

    /// Read back plain text, if any. Used by external collaborators.
    pub fn get_plain() -> Option<String> {
        Clipboard::new().ok()?.get_text().ok()
    }

    /// Whether a clipboard can be opened at all.
    pub fn is_available() -> bool {
        Clipboard::new().is_ok()
    }
}

/// Wrap an HTML fragment in a full document so word processors apply
/// consistent styling when pasting.
fn wrap_html_document(fragment: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<style>\n\
         body {{ font-family: Arial, sans-serif; font-size: 11pt; }}\n\
         h1 {{ font-size: 18pt; font-weight: bold; }}\n\
         h2 {{ font-size: 14pt; font-weight: bold; }}\n\
         h3 {{ font-size: 12pt; font-weight: bold; }}\n\
         strong {{ font-weight: bold; }}\n\
         em {{ font-style: italic; }}\n\
         </style>\n</head>\n<body>\n{fragment}\n</body>\n</html>"
    )
}
