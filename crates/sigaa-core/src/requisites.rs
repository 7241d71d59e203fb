//! Requisite expressions as printed on component detail pages, e.g.
//! `( ( FGA0158 ) OU ( FGA0073 E FGA0074 ) )`, flattened to disjunctive normal form.

use crate::{IngestError, IngestResult};

/// Outer vec is OR, inner vec is AND. Empty means "no requisite".
pub type RequisiteGroups = Vec<Vec<String>>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Open,
    Close,
    Or,
    And,
    Code(String),
}

fn tokenize(raw: &str) -> Vec<Token> {
    let spaced = raw.replace('(', " ( ").replace(')', " ) ");
    spaced
        .split_whitespace()
        .map(|word| match word {
            "(" => Token::Open,
            ")" => Token::Close,
            w if w.eq_ignore_ascii_case("OU") => Token::Or,
            w if w.eq_ignore_ascii_case("E") => Token::And,
            w => Token::Code(w.to_string()),
        })
        .collect()
}

struct Parser<'a> {
    raw: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn malformed(&self) -> IngestError {
        IngestError::malformed("requisite expression", self.raw)
    }

    fn or_expr(&mut self) -> IngestResult<RequisiteGroups> {
        let mut groups = self.and_expr()?;
        while self.peek() == Some(&Token::Or) {
            self.bump();
            groups.extend(self.and_expr()?);
        }
        Ok(groups)
    }

    fn and_expr(&mut self) -> IngestResult<RequisiteGroups> {
        let mut groups = self.atom()?;
        while self.peek() == Some(&Token::And) {
            self.bump();
            let rhs = self.atom()?;
            groups = cross(&groups, &rhs);
        }
        Ok(groups)
    }

    fn atom(&mut self) -> IngestResult<RequisiteGroups> {
        match self.bump() {
            Some(Token::Code(code)) => Ok(vec![vec![code]]),
            Some(Token::Open) => {
                let inner = self.or_expr()?;
                match self.bump() {
                    Some(Token::Close) => Ok(inner),
                    _ => Err(self.malformed()),
                }
            }
            _ => Err(self.malformed()),
        }
    }
}

fn cross(lhs: &RequisiteGroups, rhs: &RequisiteGroups) -> RequisiteGroups {
    let mut out = Vec::with_capacity(lhs.len() * rhs.len());
    for a in lhs {
        for b in rhs {
            let mut group = a.clone();
            for code in b {
                if !group.contains(code) {
                    group.push(code.clone());
                }
            }
            out.push(group);
        }
    }
    out
}

/// Parse a requisite cell. `"-"`, blank, or "nenhum"-style placeholders yield no groups.
pub fn parse_requisite_expression(raw: &str) -> IngestResult<RequisiteGroups> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "-" || trimmed.eq_ignore_ascii_case("nenhum") {
        return Ok(Vec::new());
    }
    let mut parser = Parser {
        raw,
        tokens: tokenize(trimmed),
        pos: 0,
    };
    let groups = parser.or_expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(parser.malformed());
    }

    let mut unique: RequisiteGroups = Vec::with_capacity(groups.len());
    for group in groups {
        if !unique.contains(&group) {
            unique.push(group);
        }
    }
    Ok(unique)
}

/// Every code mentioned anywhere in the groups, first-seen order.
pub fn all_codes(groups: &RequisiteGroups) -> Vec<String> {
    let mut codes: Vec<String> = Vec::new();
    for code in groups.iter().flatten() {
        if !codes.contains(code) {
            codes.push(code.clone());
        }
    }
    codes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn groups(raw: &[&[&str]]) -> RequisiteGroups {
        raw.iter()
            .map(|g| g.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    #[test]
    fn placeholder_means_no_requisites() {
        assert!(parse_requisite_expression("-").unwrap().is_empty());
        assert!(parse_requisite_expression("   ").unwrap().is_empty());
    }

    #[test]
    fn single_code_in_parentheses() {
        assert_eq!(
            parse_requisite_expression("( FGA0158 )").unwrap(),
            groups(&[&["FGA0158"]])
        );
    }

    #[test]
    fn or_of_and_groups() {
        assert_eq!(
            parse_requisite_expression("( ( FGA0158 ) OU ( FGA0073 E FGA0074 ) )").unwrap(),
            groups(&[&["FGA0158"], &["FGA0073", "FGA0074"]])
        );
    }

    #[test]
    fn and_distributes_over_or() {
        assert_eq!(
            parse_requisite_expression("( MAT0025 E ( FGA0073 OU FGA0074 ) )").unwrap(),
            groups(&[&["MAT0025", "FGA0073"], &["MAT0025", "FGA0074"]])
        );
    }

    #[test]
    fn unbalanced_expression_is_malformed() {
        assert!(parse_requisite_expression("( FGA0158 OU").is_err());
        assert!(parse_requisite_expression("FGA0158 )").is_err());
    }

    #[test]
    fn all_codes_flattens_without_duplicates() {
        let parsed = parse_requisite_expression("( A E B ) OU ( A E C )").unwrap();
        assert_eq!(all_codes(&parsed), vec!["A", "B", "C"]);
    }
}
