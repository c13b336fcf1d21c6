//! Renders the C surface text for a chosen translation target.

use crate::classify::TranslationTarget;
use crate::facts::Macro;

/// Render the replacement text for a macro and its chosen target
///
/// `signature` is the type signature taken from any invocation; the
/// classification preconditions guarantee all invocations agree on it. The
/// body is copied verbatim from the definition. `static` keeps the
/// replacement out of other translation units' way when it lands in a
/// header included more than once.
#[must_use]
pub fn render(m: &Macro, target: TranslationTarget, signature: &str) -> String {
    let body = &m.body;
    match target {
        TranslationTarget::VoidFunction => {
            format!("static inline {signature} {{ {body}; }}")
        }
        TranslationTarget::NonVoidFunction => {
            format!("static inline {signature} {{ return {body}; }}")
        }
        TranslationTarget::GlobalVariable => {
            format!("static const {signature} = {body};")
        }
        TranslationTarget::Enum => {
            format!("enum {{ {} = {body} }};", m.name)
        }
    }
}
