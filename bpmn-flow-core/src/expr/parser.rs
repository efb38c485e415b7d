//! Nom grammar for gateway conditions.
//!
//! ```text
//! expr     := or
//! or       := and (("||" | "or") and)*
//! and      := unary (("&&" | "and") unary)*
//! unary    := ("!" | "not") unary | compare
//! compare  := operand (cmp_op operand)?
//! operand  := "(" expr ")" | string | number | true | false | null | path
//! path     := ident ("." (ident | digits))*
//! ```

use nom::{
    branch::alt,
    bytes::complete::{escaped_transform, tag, take_while},
    character::complete::{char, digit1, multispace0, none_of, satisfy},
    combinator::{all_consuming, map, map_res, not, opt, recognize, value},
    error::{Error as NomError, ErrorKind},
    multi::many0,
    number::complete::recognize_float,
    sequence::{delimited, pair, preceded, terminated},
    IResult,
};
use serde_json::Value;

use super::{CmpOp, Expr, ExprError};

/// Deepest run of parentheses and negations a condition may contain.
pub const MAX_NESTING: usize = 64;

// =============================================================================
// ENTRY POINT
// =============================================================================

/// Parse a condition string, stripping an optional `${ … }` wrapper.
pub fn parse_expression(source: &str) -> Result<Expr, ExprError> {
    let trimmed = source.trim();
    let body = trimmed
        .strip_prefix("${")
        .and_then(|rest| rest.strip_suffix('}'))
        .unwrap_or(trimmed);

    match all_consuming(ws(|i| parse_or(i, 0)))(body) {
        Ok((_, expr)) => Ok(expr),
        Err(nom::Err::Failure(e)) if e.code == ErrorKind::TooLarge => Err(ExprError::Syntax {
            position: body.len() - e.input.len(),
            message: format!("expression nests deeper than {MAX_NESTING} levels"),
        }),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(ExprError::Syntax {
            position: body.len() - e.input.len(),
            message: format!("unexpected input near '{}'", snippet(e.input)),
        }),
        Err(nom::Err::Incomplete(_)) => Err(ExprError::Syntax {
            position: body.len(),
            message: "unexpected end of expression".into(),
        }),
    }
}

fn snippet(rest: &str) -> &str {
    if rest.is_empty() {
        return "<end>";
    }
    let end = rest
        .char_indices()
        .nth(12)
        .map(|(ix, _)| ix)
        .unwrap_or(rest.len());
    &rest[..end]
}

// =============================================================================
// CONNECTIVES
// =============================================================================

fn parse_or(input: &str, depth: usize) -> IResult<&str, Expr> {
    let (input, first) = parse_and(input, depth)?;
    let (input, rest) = many0(preceded(
        ws(alt((tag("||"), keyword("or")))),
        move |i| parse_and(i, depth),
    ))(input)?;
    Ok((input, chain(first, rest, Expr::Or)))
}

fn parse_and(input: &str, depth: usize) -> IResult<&str, Expr> {
    let (input, first) = parse_unary(input, depth)?;
    let (input, rest) = many0(preceded(
        ws(alt((tag("&&"), keyword("and")))),
        move |i| parse_unary(i, depth),
    ))(input)?;
    Ok((input, chain(first, rest, Expr::And)))
}

/// A single term stays bare; longer chains become one flat node.
fn chain(first: Expr, rest: Vec<Expr>, make: fn(Vec<Expr>) -> Expr) -> Expr {
    if rest.is_empty() {
        return first;
    }
    let mut terms = Vec::with_capacity(rest.len() + 1);
    terms.push(first);
    terms.extend(rest);
    make(terms)
}

fn parse_unary(input: &str, depth: usize) -> IResult<&str, Expr> {
    let (rest, negation) = opt(ws(alt((
        terminated(tag("!"), not(char('='))),
        keyword("not"),
    ))))(input)?;
    if negation.is_none() {
        return parse_compare(input, depth);
    }
    let depth = descend(input, depth)?;
    let (rest, inner) = parse_unary(rest, depth)?;
    Ok((rest, Expr::Not(Box::new(inner))))
}

fn parse_compare(input: &str, depth: usize) -> IResult<&str, Expr> {
    let (input, lhs) = parse_operand(input, depth)?;
    let (input, rhs) = opt(pair(ws(parse_cmp_op), move |i| parse_operand(i, depth)))(input)?;
    let expr = match rhs {
        Some((op, rhs)) => Expr::Compare(op, Box::new(lhs), Box::new(rhs)),
        None => lhs,
    };
    Ok((input, expr))
}

/// Longer operators first so `<=` is not read as `<`.
fn parse_cmp_op(input: &str) -> IResult<&str, CmpOp> {
    alt((
        value(CmpOp::Eq, tag("===")),
        value(CmpOp::Ne, tag("!==")),
        value(CmpOp::Eq, tag("==")),
        value(CmpOp::Ne, tag("!=")),
        value(CmpOp::Le, tag("<=")),
        value(CmpOp::Ge, tag(">=")),
        value(CmpOp::Lt, tag("<")),
        value(CmpOp::Gt, tag(">")),
    ))(input)
}

// =============================================================================
// OPERANDS
// =============================================================================

fn parse_operand(input: &str, depth: usize) -> IResult<&str, Expr> {
    ws(alt((
        move |i| parse_group(i, depth),
        map(parse_string, |s| Expr::Literal(Value::String(s))),
        map(parse_number, Expr::Literal),
        value(Expr::Literal(Value::Bool(true)), keyword("true")),
        value(Expr::Literal(Value::Bool(false)), keyword("false")),
        value(Expr::Literal(Value::Null), keyword("null")),
        map(
            pair(parse_ident, many0(preceded(char('.'), alt((parse_ident, digit1))))),
            |(root, rest)| {
                let mut segments = vec![root.to_string()];
                segments.extend(rest.into_iter().map(str::to_string));
                Expr::Path(segments)
            },
        ),
    )))(input)
}

fn parse_group(input: &str, depth: usize) -> IResult<&str, Expr> {
    let inner = if input.starts_with('(') {
        descend(input, depth)?
    } else {
        depth
    };
    delimited(char('('), ws(move |i| parse_or(i, inner)), char(')'))(input)
}

fn parse_string(input: &str) -> IResult<&str, String> {
    alt((
        delimited(
            char('"'),
            map(opt(escaped_transform(none_of("\\\""), '\\', parse_escape)), Option::unwrap_or_default),
            char('"'),
        ),
        delimited(
            char('\''),
            map(opt(escaped_transform(none_of("\\'"), '\\', parse_escape)), Option::unwrap_or_default),
            char('\''),
        ),
    ))(input)
}

fn parse_escape(input: &str) -> IResult<&str, &str> {
    alt((
        value("\\", tag("\\")),
        value("\"", tag("\"")),
        value("'", tag("'")),
        value("\n", tag("n")),
        value("\t", tag("t")),
    ))(input)
}

/// Integers stay integers so `count == 3` compares exactly.
fn parse_number(input: &str) -> IResult<&str, Value> {
    map_res(recognize_float, |raw: &str| {
        if let Ok(int) = raw.parse::<i64>() {
            return Ok(Value::from(int));
        }
        raw.parse::<f64>()
            .map_err(|e| e.to_string())
            .and_then(|f| {
                serde_json::Number::from_f64(f)
                    .map(Value::Number)
                    .ok_or_else(|| format!("non-finite number {raw}"))
            })
    })(input)
}

fn parse_ident(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|c| c.is_alphabetic() || c == '_' || c == '$'),
        take_while(is_ident_char),
    ))(input)
}

// =============================================================================
// HELPERS
// =============================================================================

/// Fails hard once grouping or negation nests past [`MAX_NESTING`].
fn descend(input: &str, depth: usize) -> Result<usize, nom::Err<NomError<&str>>> {
    if depth >= MAX_NESTING {
        return Err(nom::Err::Failure(NomError::new(input, ErrorKind::TooLarge)));
    }
    Ok(depth + 1)
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// A word operator or literal that must not run into an identifier.
fn keyword<'a>(kw: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    terminated(tag(kw), not(satisfy(is_ident_char)))
}

fn ws<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(segments: &[&str]) -> Box<Expr> {
        Box::new(Expr::Path(segments.iter().map(|s| s.to_string()).collect()))
    }

    #[test]
    fn test_parse_comparison() {
        assert_eq!(
            parse_expression("amount > 1000").unwrap(),
            Expr::Compare(CmpOp::Gt, path(&["amount"]), Box::new(Expr::Literal(json!(1000))))
        );
    }

    #[test]
    fn test_parse_strips_placeholder_wrapper() {
        assert_eq!(
            parse_expression("${ approved == true }").unwrap(),
            parse_expression("approved == true").unwrap()
        );
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let expr = parse_expression("a || b && c").unwrap();
        assert_eq!(
            expr,
            Expr::Or(vec![
                *path(&["a"]),
                Expr::And(vec![*path(&["b"]), *path(&["c"])]),
            ])
        );
    }

    #[test]
    fn test_long_chains_stay_flat() {
        let source = vec!["flag"; 5_000].join(" && ");
        match parse_expression(&source).unwrap() {
            Expr::And(terms) => assert_eq!(terms.len(), 5_000),
            other => panic!("expected a flat conjunction, got {other:?}"),
        }
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let parens = format!("{}a{}", "(".repeat(10_000), ")".repeat(10_000));
        match parse_expression(&parens) {
            Err(ExprError::Syntax { message, .. }) => assert!(message.contains("nests deeper")),
            other => panic!("expected syntax error, got {other:?}"),
        }

        let negations = format!("{}a", "!".repeat(10_000));
        assert!(matches!(
            parse_expression(&negations),
            Err(ExprError::Syntax { .. })
        ));

        let moderate = format!("{}a == 1{}", "(".repeat(10), ")".repeat(10));
        assert!(parse_expression(&moderate).is_ok());
        assert!(parse_expression("!!!flag").is_ok());
    }

    #[test]
    fn test_word_operators_and_nested_paths() {
        let expr = parse_expression("not order.express and (region == 'EU' or total >= 2.5)");
        assert!(expr.is_ok(), "{expr:?}");
    }

    #[test]
    fn test_keyword_prefix_is_an_identifier() {
        assert_eq!(parse_expression("notes").unwrap(), *path(&["notes"]));
        assert_eq!(parse_expression("trueValue").unwrap(), *path(&["trueValue"]));
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            parse_expression(r#"name == "a \"b\"""#).unwrap(),
            Expr::Compare(
                CmpOp::Eq,
                path(&["name"]),
                Box::new(Expr::Literal(json!("a \"b\"")))
            )
        );
        assert_eq!(
            parse_expression("name != ''").unwrap(),
            Expr::Compare(CmpOp::Ne, path(&["name"]), Box::new(Expr::Literal(json!(""))))
        );
    }

    #[test]
    fn test_syntax_error_reports_position() {
        match parse_expression("amount >> 3") {
            Err(ExprError::Syntax { position, .. }) => assert!(position > 0),
            other => panic!("expected syntax error, got {other:?}"),
        }
        assert!(matches!(parse_expression(""), Err(ExprError::Syntax { .. })));
        assert!(matches!(
            parse_expression("process.exit(1)"),
            Err(ExprError::Syntax { .. })
        ));
    }
}
