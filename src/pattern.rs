//! Case-insensitive filename matching for enumeration.
//!
//! Globs are translated to anchored regular expressions:
//! `*` matches within one path segment, `**` across segments (`**/` matches
//! zero or more whole segments), `?` one non-separator character, `[...]` a
//! character class (`[!...]` negated) and `{a,b}` an alternation.

use std::iter::Peekable;
use std::str::Chars;

use regex::{Regex, RegexBuilder};

#[derive(Debug, Clone)]
pub struct GlobPattern {
    glob:  String,
    regex: Regex,
}

impl GlobPattern {
    pub fn new(glob: &str) -> Result<Self, regex::Error> {
        let regex = RegexBuilder::new(&glob_to_regex(glob))
            .case_insensitive(true)
            .build()?;
        Ok(Self { glob: glob.to_owned(), regex })
    }

    pub fn as_str(&self) -> &str {
        &self.glob
    }

    pub fn matches(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }
}

/// ASCII case-insensitive `starts_with`.
pub fn has_prefix_ignore_case(name: &str, prefix: &str) -> bool {
    name.len() >= prefix.len()
        && name.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

fn glob_to_regex(glob: &str) -> String {
    let mut regex = String::with_capacity(glob.len() * 2 + 2);
    let mut chars = glob.chars().peekable();

    regex.push('^');
    translate(&mut chars, &mut regex, false);
    regex.push('$');
    regex
}

/// Translate until the input ends or, inside `{...}`, until the closing brace.
fn translate(chars: &mut Peekable<Chars<'_>>, regex: &mut String, in_braces: bool) {
    while let Some(ch) = chars.next() {
        match ch {
            '}' if in_braces => return,
            ',' if in_braces => regex.push('|'),
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    if chars.peek() == Some(&'/') {
                        chars.next();
                        regex.push_str("(?:[^/]*/)*");
                    } else {
                        regex.push_str(".*");
                    }
                } else {
                    regex.push_str("[^/]*");
                }
            }
            '?' => regex.push_str("[^/]"),
            '[' => {
                regex.push('[');
                if chars.peek() == Some(&'!') {
                    chars.next();
                    regex.push('^');
                }
                for ch in chars.by_ref() {
                    if ch == ']' {
                        break;
                    }
                    if ch == '\\' || ch == '[' {
                        regex.push('\\');
                    }
                    regex.push(ch);
                }
                regex.push(']');
            }
            '{' => {
                regex.push_str("(?:");
                translate(chars, regex, true);
                regex.push(')');
            }
            c => push_literal(regex, c),
        }
    }
}

fn push_literal(regex: &mut String, c: char) {
    if "^$()[]{}|+.*?\\".contains(c) {
        regex.push('\\');
    }
    regex.push(c);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(glob: &str, name: &str) -> bool {
        GlobPattern::new(glob).unwrap().matches(name)
    }

    #[test]
    fn star_stays_within_segment() {
        assert!(m("bdat/*.bdat", "bdat/common.bdat"));
        assert!(!m("bdat/*.bdat", "bdat/gb/common.bdat"));
        assert!(!m("*.bdat", "bdat/common.bdat"));
    }

    #[test]
    fn double_star_crosses_segments() {
        assert!(m("**/*.wilay", "menu/image/a.wilay"));
        assert!(m("**/*.wilay", "a.wilay"));
        assert!(m("menu/**", "menu/image/a.wilay"));
    }

    #[test]
    fn matching_ignores_case() {
        assert!(m("/Common/*.BDAT", "/common/item.bdat"));
    }

    #[test]
    fn classes_alternation_and_question_mark() {
        assert!(m("map/ma0[1-3]a.bin", "map/ma02a.bin"));
        assert!(!m("map/ma0[!1-3]a.bin", "map/ma02a.bin"));
        assert!(m("*.{wismt,wimdo}", "pc000101.wimdo"));
        assert!(!m("*.{wismt,wimdo}", "pc000101.wismda"));
        assert!(m("a?c", "abc"));
        assert!(!m("a?c", "a/c"));
    }

    #[test]
    fn wildcards_work_inside_braces() {
        assert!(m("*.{bd*,wi*}", "a.bdat"));
        assert!(m("*.{bd*,wi*}", "mnu_top.wilay"));
        assert!(!m("*.{bd*,wi*}", "a.txt"));
        assert!(m("{map/ma0?a,**/[!x]*}.bin", "map/ma02a.bin"));
        assert!(m("{map/ma0?a,**/[!x]*}.bin", "deep/dir/y.bin"));
        assert!(!m("{map/ma0?a,**/[!x]*}.bin", "deep/dir/x.bin"));
        assert!(m("*.{a,{b,c}*}", "f.cd"));
    }

    #[test]
    fn regex_metacharacters_are_literal() {
        assert!(m("a+b (1).txt", "a+b (1).txt"));
        assert!(!m("a.b", "axb"));
    }

    #[test]
    fn prefix_match_ignores_case() {
        assert!(has_prefix_ignore_case("/Menu/Image/a.wilay", "/menu/"));
        assert!(!has_prefix_ignore_case("/me", "/menu/"));
    }
}
