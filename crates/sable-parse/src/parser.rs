//! Baseline recursive parser.
//!
//! Statement-oriented: the source is split into statements at newlines and
//! `;`, then parsed with a scope stack. Class and method definitions, `sig`
//! annotations, and visibility-modifier sends are recognized structurally;
//! every other statement is kept as an opaque body expression.

use sable_ast::ast::VISIBILITY_MODIFIERS;
use sable_ast::{ClassDef, ClassName, Expr, Lit, Loc, MethodDef, Send};

use crate::{ParseError, Parser};

#[derive(Debug, Clone, Copy)]
struct Stmt<'a> {
    line: u32,
    text: &'a str,
}

#[derive(Debug, Default)]
pub struct ScriptParser;

impl ScriptParser {
    pub fn new() -> Self {
        Self
    }
}

impl Parser for ScriptParser {
    fn parse(&self, text: &str) -> Result<Expr, ParseError> {
        let stmts = statements(text);
        let mut cursor = Cursor {
            stmts,
            pos: 0,
            last_line: text.lines().count().saturating_sub(1) as u32,
        };
        let body = cursor.parse_body(true)?;
        Ok(Expr::Seq(body))
    }
}

fn statements(text: &str) -> Vec<Stmt<'_>> {
    let mut stmts = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let trimmed = strip_comment(line.trim());
        if trimmed.is_empty() {
            continue;
        }
        for piece in trimmed.split(';') {
            let piece = piece.trim();
            if !piece.is_empty() {
                stmts.push(Stmt {
                    line: line_no as u32,
                    text: piece,
                });
            }
        }
    }
    stmts
}

/// Drops a trailing comment: a `#` at the start of the line or preceded by
/// whitespace. A `#` glued to other text (string interpolation) is kept.
fn strip_comment(line: &str) -> &str {
    let mut prev_is_space = true;
    for (i, c) in line.char_indices() {
        if c == '#' && prev_is_space {
            return line[..i].trim_end();
        }
        prev_is_space = c.is_whitespace();
    }
    line
}

struct Cursor<'a> {
    stmts: Vec<Stmt<'a>>,
    pos: usize,
    last_line: u32,
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> Option<Stmt<'a>> {
        self.stmts.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<Stmt<'a>> {
        let stmt = self.peek()?;
        self.pos += 1;
        Some(stmt)
    }

    fn parse_body(&mut self, top_level: bool) -> Result<Vec<Expr>, ParseError> {
        let mut body = Vec::new();
        while let Some(stmt) = self.peek() {
            if stmt.text == "end" {
                if top_level {
                    return Err(ParseError::new(stmt.line, "unexpected `end`"));
                }
                return Ok(body);
            }
            body.push(self.parse_stmt()?);
        }
        if top_level {
            Ok(body)
        } else {
            Err(ParseError::new(
                self.last_line,
                "unexpected end of file, expected `end`",
            ))
        }
    }

    fn parse_stmt(&mut self) -> Result<Expr, ParseError> {
        let stmt = self.bump().expect("caller peeked");
        let loc = Loc::new(stmt.line);
        let text = stmt.text;

        if let Some(rest) = text.strip_prefix("class ") {
            return self.parse_class(rest.trim(), loc);
        }
        if let Some(rest) = text.strip_prefix("def ") {
            let method = self.parse_method(rest.trim(), loc)?;
            return Ok(Expr::MethodDef(method));
        }
        for &modifier in VISIBILITY_MODIFIERS {
            if let Some(rest) = text.strip_prefix(modifier) {
                let rest = rest.trim_start();
                if let Some(header) = rest.strip_prefix("def ") {
                    let method = self.parse_method(header.trim(), loc)?;
                    return Ok(Expr::Send(Send {
                        fun: modifier.to_owned(),
                        args: vec![Expr::MethodDef(method)],
                        loc,
                    }));
                }
                // `private` on its own line, or applied to a symbol: keep it
                // as an opaque statement.
                if rest.is_empty() || text.starts_with(&format!("{modifier} ")) {
                    return Ok(Expr::Lit(Lit {
                        text: text.to_owned(),
                        loc,
                    }));
                }
            }
        }
        if text == "sig" || text.starts_with("sig ") || text.starts_with("sig{") || text.starts_with("sig(")
        {
            let opens = text.matches(['{', '(']).count();
            let closes = text.matches(['}', ')']).count();
            if opens != closes {
                return Err(ParseError::new(loc.line, "unclosed bracket in signature"));
            }
            let payload = text["sig".len()..].trim().to_owned();
            return Ok(Expr::Send(Send {
                fun: "sig".to_owned(),
                args: vec![Expr::Lit(Lit { text: payload, loc })],
                loc,
            }));
        }

        Ok(Expr::Lit(Lit {
            text: text.to_owned(),
            loc,
        }))
    }

    fn parse_class(&mut self, header: &str, loc: Loc) -> Result<Expr, ParseError> {
        let (name, ancestors) = if header == "<< self" {
            (ClassName::Singleton, Vec::new())
        } else {
            let (name, ancestors) = match header.split_once('<') {
                Some((name, ancestors)) => (
                    name.trim(),
                    ancestors
                        .split(',')
                        .map(|a| a.trim().to_owned())
                        .filter(|a| !a.is_empty())
                        .collect(),
                ),
                None => (header, Vec::new()),
            };
            let valid = name.chars().next().is_some_and(|c| c.is_ascii_uppercase())
                && name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | ':'));
            if !valid {
                return Err(ParseError::new(loc.line, format!("invalid class name `{name}`")));
            }
            (ClassName::Ident(name.to_owned()), ancestors)
        };

        let body = self.parse_body(false)?;
        self.expect_end()?;
        Ok(Expr::ClassDef(ClassDef {
            name,
            ancestors,
            body,
            loc,
        }))
    }

    fn parse_method(&mut self, header: &str, loc: Loc) -> Result<MethodDef, ParseError> {
        let (target, params) = match header.split_once('(') {
            Some((target, rest)) => {
                let Some(params) = rest.strip_suffix(')') else {
                    return Err(ParseError::new(
                        loc.line,
                        "unclosed bracket in method parameters",
                    ));
                };
                (
                    target.trim(),
                    params
                        .split(',')
                        .map(|p| p.trim().to_owned())
                        .filter(|p| !p.is_empty())
                        .collect(),
                )
            }
            None => (header, Vec::new()),
        };

        let (name, is_self) = match target.strip_prefix("self.") {
            Some(name) => (name.trim(), true),
            None => (target, false),
        };
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '?' | '!' | '='))
        {
            return Err(ParseError::new(loc.line, format!("invalid method name `{name}`")));
        }

        let body = self.parse_body(false)?;
        self.expect_end()?;
        Ok(MethodDef {
            name: name.to_owned(),
            params,
            body,
            is_self,
            loc,
        })
    }

    fn expect_end(&mut self) -> Result<(), ParseError> {
        match self.bump() {
            Some(stmt) if stmt.text == "end" => Ok(()),
            Some(stmt) => Err(ParseError::new(stmt.line, "expected `end`")),
            None => Err(ParseError::new(
                self.last_line,
                "unexpected end of file, expected `end`",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(text: &str) -> Expr {
        ScriptParser::new().parse(text).expect("parse")
    }

    fn parse_err(text: &str) -> ParseError {
        ScriptParser::new().parse(text).expect_err("parse error")
    }

    #[test]
    fn parses_a_class_with_methods_on_one_line() {
        let tree = parse("class A; def f; 1; end; end");
        let Expr::Seq(stats) = tree else {
            panic!("expected top-level sequence");
        };
        let Expr::ClassDef(class) = &stats[0] else {
            panic!("expected class");
        };
        assert_eq!(class.name, ClassName::Ident("A".to_owned()));
        let Expr::MethodDef(method) = &class.body[0] else {
            panic!("expected method");
        };
        assert_eq!(method.name, "f");
        assert_eq!(method.body, vec![Expr::Lit(Lit {
            text: "1".to_owned(),
            loc: Loc::new(0),
        })]);
    }

    #[test]
    fn parses_self_methods_and_params() {
        let tree = parse("class A\n  def self.make(x, y)\n    x\n  end\nend\n");
        let Expr::Seq(stats) = tree else {
            panic!("expected sequence");
        };
        let Expr::ClassDef(class) = &stats[0] else {
            panic!("expected class");
        };
        let Expr::MethodDef(method) = &class.body[0] else {
            panic!("expected method");
        };
        assert!(method.is_self);
        assert_eq!(method.params, vec!["x".to_owned(), "y".to_owned()]);
        assert_eq!(method.loc, Loc::new(1));
    }

    #[test]
    fn parses_ancestors() {
        let tree = parse("class B < A\nend\n");
        let Expr::Seq(stats) = tree else {
            panic!("expected sequence");
        };
        let Expr::ClassDef(class) = &stats[0] else {
            panic!("expected class");
        };
        assert_eq!(class.ancestors, vec!["A".to_owned()]);
    }

    #[test]
    fn parses_visibility_modifiers_and_sigs() {
        let tree = parse("class A\n  sig {returns(Integer)}\n  private def f\n    1\n  end\nend\n");
        let Expr::Seq(stats) = tree else {
            panic!("expected sequence");
        };
        let Expr::ClassDef(class) = &stats[0] else {
            panic!("expected class");
        };
        assert!(matches!(&class.body[0], Expr::Send(s) if s.is_sig()));
        let Expr::Send(private) = &class.body[1] else {
            panic!("expected modifier send");
        };
        assert!(private.is_method_modifier());
    }

    #[test]
    fn parses_singleton_class_blocks() {
        let tree = parse("class A\n  class << self\n    def f\n    end\n  end\nend\n");
        let Expr::Seq(stats) = tree else {
            panic!("expected sequence");
        };
        let Expr::ClassDef(class) = &stats[0] else {
            panic!("expected class");
        };
        let Expr::ClassDef(block) = &class.body[0] else {
            panic!("expected singleton block");
        };
        assert_eq!(block.name, ClassName::Singleton);
    }

    #[test]
    fn missing_end_is_a_parse_error() {
        let err = parse_err("class A\n  def f\n");
        assert!(err.message.contains("expected `end`"), "{err:?}");
    }

    #[test]
    fn stray_end_is_a_parse_error() {
        let err = parse_err("end\n");
        assert_eq!(err.message, "unexpected `end`");
        assert_eq!(err.line, 0);
    }

    #[test]
    fn unclosed_parameter_list_is_a_parse_error() {
        let err = parse_err("class A\n  def f(x\n  end\nend\n");
        assert_eq!(err.message, "unclosed bracket in method parameters");
        assert_eq!(err.line, 1);
    }

    #[test]
    fn unclosed_sig_brace_is_a_parse_error() {
        let err = parse_err("class A\n  sig {returns(Integer\n  def f; end\nend\n");
        assert_eq!(err.message, "unclosed bracket in signature");
    }

    #[test]
    fn comments_are_skipped() {
        let tree = parse("# typed: true\nclass A # not parsed as a statement\nend\n");
        let Expr::Seq(stats) = tree else {
            panic!("expected sequence");
        };
        assert_eq!(stats.len(), 1);
    }
}
