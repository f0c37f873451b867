//! MarkdownV2 escaping for text that comes from the schedule sheet or from users.

/// Characters Telegram's MarkdownV2 treats as markup outside of code spans.
const RESERVED: &[char] = &[
    '\\', '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
];

/// Escapes `text` so it renders literally inside a MarkdownV2 message.
///
/// Exam names are free text typed into the sheet, so any of the reserved
/// characters can show up, the backslash included.
///
/// ```
/// use exam_notifier_bot::utils::markdown::escape_markdown;
///
/// assert_eq!(escape_markdown("בוחן (פרק 3) - גרסה ב'"), "בוחן \\(פרק 3\\) \\- גרסה ב'");
/// ```
pub fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if RESERVED.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
