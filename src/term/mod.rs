use std::io;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

// Color tags use the form §X where X selects the foreground color:
// digits 0-7 map to the dim ANSI colors 30-37, 8/9/A-F to the bold
// variants, and §R resets all attributes. Any other sequence is left
// in the output untouched.
static COLORS_ENABLED: AtomicBool = AtomicBool::new(true);

pub fn set_colors_enabled(enabled: bool) {
    COLORS_ENABLED.store(enabled, Ordering::Relaxed);
}

pub fn colors_enabled() -> bool {
    COLORS_ENABLED.load(Ordering::Relaxed)
}

fn escape_for(tag: char) -> Option<String> {
    match tag {
        'R' => Some(String::from("\x1b[0m")),
        '0'..='7' => Some(format!("\x1b[0;{}m", 30 + tag as u32 - '0' as u32)),
        '8' | '9' => Some(format!("\x1b[1;{}m", 30 + tag as u32 - '8' as u32)),
        'A'..='F' => Some(format!("\x1b[1;{}m", 32 + tag as u32 - 'A' as u32)),
        _ => None,
    }
}

/// Replaces every §X color tag with its ANSI escape, or strips the tags
/// entirely when `output_colors` is false. All other characters pass
/// through unchanged.
pub fn colorize(input: &str, output_colors: bool) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '§' {
            out.push(ch);
            continue;
        }
        match chars.peek().copied() {
            Some(tag) => match escape_for(tag) {
                Some(escape) => {
                    chars.next();
                    if output_colors {
                        out.push_str(&escape);
                    }
                }
                // not a color tag, keep the § and the character after it
                None => out.push(ch),
            },
            None => out.push(ch),
        }
    }

    out
}

pub fn print_colorized(text: &str) {
    let rendered = colorize(text, colors_enabled());
    print!("{}", rendered);
    io::stdout().flush().ok();
}

/// Formats and prints a §-tagged message on stdout.
#[macro_export]
macro_rules! prints {
    ($($arg:tt)*) => {
        $crate::term::print_colorized(&format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dim_and_bold_tags_become_ansi_escapes() {
        assert_eq!(colorize("§6cyan", true), "\x1b[0;36mcyan");
        assert_eq!(colorize("§9red", true), "\x1b[1;31mred");
        assert_eq!(colorize("§Byellow", true), "\x1b[1;33myellow");
        assert_eq!(colorize("§Fwhite§R", true), "\x1b[1;37mwhite\x1b[0m");
    }

    #[test]
    fn tags_are_stripped_when_colors_are_off() {
        assert_eq!(colorize("§9[ERR!]§R done", false), "[ERR!] done");
    }

    #[test]
    fn unrecognized_sequences_are_preserved() {
        assert_eq!(colorize("a §Z b", false), "a §Z b");
        assert_eq!(colorize("trailing §", true), "trailing §");
    }

    #[test]
    fn plain_text_is_untouched() {
        let line = "[ 5h] 1.004: LDA [4h]";
        assert_eq!(colorize(line, true), line);
        assert_eq!(colorize(line, false), line);
    }
}
