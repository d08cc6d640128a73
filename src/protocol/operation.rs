//! Grounded operation grammar.
//!
//! The agent model describes each action in a constrained textual syntax,
//! e.g. `tap(x=10,y=20,box=[[100,200,300,400]])`. This module decodes one
//! such string into a typed [`Operation`]. Decoding never fails: anything
//! that does not parse degrades to [`Operation::NoAction`], which is the
//! normal way a task run concludes.

use std::collections::HashMap;

/// One decoded operation, or the `NO_ACTION` sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    NoAction,
    Grounded(GroundedOperation),
}

/// A structured, executable operation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GroundedOperation {
    /// Operation identifier, e.g. "tap" or "type".
    pub name: String,
    /// Raw string parameters, keyed by name. Duplicate keys in the source
    /// text resolve last-wins.
    pub params: HashMap<String, String>,
    /// Target region on the 0–1000 pixel scale, from the first
    /// `box=[[x,y,x,y]]` sub-pattern in the operation detail.
    pub bbox: Option<[i64; 4]>,
}

impl Operation {
    /// Decode a raw step string. `None`, unbalanced brackets, or a string
    /// without any `(` all yield [`Operation::NoAction`].
    pub fn parse(step: Option<&str>) -> Operation {
        let Some(step) = step else {
            return Operation::NoAction;
        };
        if !is_balanced(step) {
            return Operation::NoAction;
        }
        let Some((name, rest)) = step.split_once('(') else {
            return Operation::NoAction;
        };
        let detail = format!("({rest}");

        let mut params = scan_params(&detail);
        let bbox = extract_box(&detail);
        if bbox.is_some() {
            // The key-value scan captures a truncated `box` fragment like
            // "[[100"; the structured field supersedes it.
            params.remove("box");
        }

        Operation::Grounded(GroundedOperation {
            name: name.trim().to_string(),
            params,
            bbox,
        })
    }

    pub fn is_no_action(&self) -> bool {
        matches!(self, Operation::NoAction)
    }
}

/// Bracket balance check over `()`, `[]` and `{}`.
///
/// A string with zero `(` characters is always unbalanced, whatever its
/// other brackets look like: an operation must carry a parameter list.
fn is_balanced(s: &str) -> bool {
    if !s.contains('(') {
        return false;
    }
    let mut stack: Vec<char> = Vec::new();
    for c in s.chars() {
        match c {
            '(' | '[' | '{' => stack.push(c),
            ')' | ']' | '}' => {
                let open = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                if stack.pop() != Some(open) {
                    return false;
                }
            }
            _ => {}
        }
    }
    stack.is_empty()
}

fn is_word(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Collect every `key = value` occurrence in the operation detail.
///
/// A key is a contiguous word-character run; a value is any non-empty run
/// excluding `,` and `)`. Later duplicates overwrite earlier ones.
fn scan_params(detail: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let chars: Vec<char> = detail.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        if !is_word(chars[i]) {
            i += 1;
            continue;
        }
        let key_start = i;
        while i < chars.len() && is_word(chars[i]) {
            i += 1;
        }
        let key: String = chars[key_start..i].iter().collect();

        let mut j = i;
        while j < chars.len() && chars[j].is_whitespace() {
            j += 1;
        }
        if j >= chars.len() || chars[j] != '=' {
            continue;
        }
        j += 1;
        while j < chars.len() && chars[j].is_whitespace() {
            j += 1;
        }

        let val_start = j;
        while j < chars.len() && chars[j] != ',' && chars[j] != ')' {
            j += 1;
        }
        if j > val_start {
            let value: String = chars[val_start..j].iter().collect();
            params.insert(key, value);
            i = j;
        }
    }

    params
}

/// First `box=[[ ... ]]` occurrence in the detail, parsed as exactly four
/// integers. Anything else (wrong arity, non-numeric) yields `None`.
fn extract_box(detail: &str) -> Option<[i64; 4]> {
    let start = detail.find("box=[[")? + "box=[[".len();
    let rest = &detail[start..];
    let inner = &rest[..rest.find("]]")?];

    let mut vals = [0i64; 4];
    let mut n = 0;
    for part in inner.split(',') {
        if n == 4 {
            return None;
        }
        vals[n] = part.trim().parse().ok()?;
        n += 1;
    }
    (n == 4).then_some(vals)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_tap_operation() {
        let op = Operation::parse(Some("tap(x=10,y=20,box=[[100,200,300,400]])"));
        let Operation::Grounded(op) = op else {
            panic!("expected grounded operation");
        };
        assert_eq!(op.name, "tap");
        assert_eq!(op.params.get("x").map(String::as_str), Some("10"));
        assert_eq!(op.params.get("y").map(String::as_str), Some("20"));
        assert_eq!(op.bbox, Some([100, 200, 300, 400]));
        assert!(!op.params.contains_key("box"));
    }

    #[test]
    fn absent_step_is_no_action() {
        assert!(Operation::parse(None).is_no_action());
    }

    #[test]
    fn no_parenthesis_is_always_no_action() {
        assert_eq!(Operation::parse(Some("")), Operation::NoAction);
        assert_eq!(Operation::parse(Some("END")), Operation::NoAction);
        assert_eq!(Operation::parse(Some("[1,2]{ok}")), Operation::NoAction);
    }

    #[test]
    fn unbalanced_step_is_no_action() {
        assert_eq!(Operation::parse(Some("unbalanced(x=1")), Operation::NoAction);
        assert_eq!(Operation::parse(Some("tap(x=1))")), Operation::NoAction);
        assert_eq!(Operation::parse(Some("tap(box=[1,2)")), Operation::NoAction);
    }

    #[test]
    fn mismatched_bracket_kind_is_no_action() {
        assert_eq!(Operation::parse(Some("tap(x=[1)]")), Operation::NoAction);
    }

    #[test]
    fn duplicate_key_last_wins() {
        let Operation::Grounded(op) = Operation::parse(Some("tap(x=1,x=2)")) else {
            panic!("expected grounded operation");
        };
        assert_eq!(op.params.get("x").map(String::as_str), Some("2"));
    }

    #[test]
    fn only_first_box_pattern_is_used() {
        let Operation::Grounded(op) =
            Operation::parse(Some("tap(box=[[1,2,3,4]],box=[[5,6,7,8]])"))
        else {
            panic!("expected grounded operation");
        };
        assert_eq!(op.bbox, Some([1, 2, 3, 4]));
    }

    #[test]
    fn single_bracket_box_stays_a_text_param() {
        let Operation::Grounded(op) = Operation::parse(Some("tap(box=[100,200,300,400])")) else {
            panic!("expected grounded operation");
        };
        assert_eq!(op.bbox, None);
        // The key-value scan stops at the first comma.
        assert_eq!(op.params.get("box").map(String::as_str), Some("[100"));
    }

    #[test]
    fn wrong_arity_box_is_dropped() {
        let Operation::Grounded(op) = Operation::parse(Some("tap(box=[[1,2]])")) else {
            panic!("expected grounded operation");
        };
        assert_eq!(op.bbox, None);
    }

    #[test]
    fn name_is_trimmed_and_values_keep_free_text() {
        let Operation::Grounded(op) =
            Operation::parse(Some("  type (text=hello world,element=search bar)"))
        else {
            panic!("expected grounded operation");
        };
        assert_eq!(op.name, "type");
        assert_eq!(op.params.get("text").map(String::as_str), Some("hello world"));
        assert_eq!(
            op.params.get("element").map(String::as_str),
            Some("search bar")
        );
    }

    #[test]
    fn no_params_still_grounded() {
        let Operation::Grounded(op) = Operation::parse(Some("screenshot()")) else {
            panic!("expected grounded operation");
        };
        assert_eq!(op.name, "screenshot");
        assert!(op.params.is_empty());
        assert_eq!(op.bbox, None);
    }
}
