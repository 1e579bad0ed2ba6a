//! Legacy bracketed macros: `<<addItem "healing potion" 2>>`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::ScriptError;

static MACRO_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<<\s*([A-Za-z_]\w*)(.*?)>>").expect("macro pattern is valid"));

/// One macro invocation with its parsed arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct MacroCall {
    pub name: String,
    pub args: Vec<Value>,
}

/// Every macro call in a line. A line without brackets is read as a single
/// bare call (`addItem "sword" 1`).
pub fn parse_line(line: &str) -> Result<Vec<MacroCall>, ScriptError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Vec::new());
    }

    if !line.contains("<<") {
        let (name, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        return Ok(vec![MacroCall {
            name: name.to_string(),
            args: tokenize_args(rest)?,
        }]);
    }

    MACRO_RE
        .captures_iter(line)
        .map(|caps| -> Result<MacroCall, ScriptError> {
            Ok(MacroCall {
                name: caps[1].to_string(),
                args: tokenize_args(&caps[2])?,
            })
        })
        .collect()
}

/// Split on whitespace, keeping double-quoted runs together.
pub fn tokenize_args(source: &str) -> Result<Vec<Value>, ScriptError> {
    let mut args = Vec::new();
    let mut chars = source.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        if c == '"' {
            chars.next();
            let mut text = String::new();
            let mut closed = false;
            while let Some(c) = chars.next() {
                match c {
                    '"' => {
                        closed = true;
                        break;
                    }
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            text.push(escaped);
                        }
                    }
                    _ => text.push(c),
                }
            }
            if !closed {
                return Err(ScriptError::MalformedMacro(format!(
                    "unterminated quote in '{}'",
                    source.trim()
                )));
            }
            args.push(Value::String(text));
            continue;
        }

        let mut token = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_whitespace() {
                break;
            }
            token.push(c);
            chars.next();
        }
        args.push(bare_value(&token));
    }

    Ok(args)
}

/// Unquoted tokens: numbers and booleans are typed, `$name` loses its sigil.
fn bare_value(token: &str) -> Value {
    if let Ok(i) = token.parse::<i64>() {
        return Value::from(i);
    }
    if let Some(n) = token.parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
        return Value::Number(n);
    }
    match token {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(token.trim_start_matches('$').to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_quoted_arguments_stay_whole() {
        let calls = parse_line(r#"<<addItem "healing potion" 2>>"#).unwrap();
        assert_eq!(
            calls,
            vec![MacroCall {
                name: "addItem".to_string(),
                args: vec![json!("healing potion"), json!(2)],
            }]
        );
    }

    #[test]
    fn test_several_macros_on_one_line() {
        let calls = parse_line(r#"<<startQuest "q1">> then <<addGold 10>>"#).unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name, "startQuest");
        assert_eq!(calls[1].args, vec![json!(10)]);
    }

    #[test]
    fn test_bare_line_and_typed_tokens() {
        let calls = parse_line("set $is_night true").unwrap();
        assert_eq!(calls[0].name, "set");
        assert_eq!(calls[0].args, vec![json!("is_night"), json!(true)]);

        let args = tokenize_args(r#"1.5 "say \"hi\"" word"#).unwrap();
        assert_eq!(args, vec![json!(1.5), json!("say \"hi\""), json!("word")]);
    }

    #[test]
    fn test_empty_and_malformed() {
        assert!(parse_line("   ").unwrap().is_empty());
        assert!(parse_line("<<>>").unwrap().is_empty());
        assert!(matches!(
            parse_line(r#"<<addItem "sword>>"#),
            Err(ScriptError::MalformedMacro(_))
        ));
    }
}
