//! Text helpers shared by the executor and the renderer.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

/// CSI and OSC escape sequences, as emitted by IPython's coloured tracebacks.
static ANSI_ESCAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)")
        .expect("ANSI escape pattern is valid")
});

/// Remove terminal colour/control escapes from `text`.
pub fn strip_ansi(text: &str) -> Cow<'_, str> {
    if !text.contains('\x1b') {
        return Cow::Borrowed(text);
    }
    ANSI_ESCAPE.replace_all(text, "")
}
