use crate::core::error::{Error, Result};
use crate::query::ast::QueryNode;

/// Hand-rolled recursive-descent parser for the query grammar (spec §4.6,
/// §9: "implementers may use a parser-combinator or hand-rolled
/// recursive-descent parser — the only normative requirement is the
/// node-kind set and precedence"). Terms are `[A-Za-z0-9_:]+`.
#[derive(Debug, Clone, PartialEq)]
enum Token {
    Term(String),
    Phrase(Vec<String>),
    ProximityStart(u32),
    And,
    Or,
    Not,
    LParen,
    RParen,
    Comma,
}

fn lex(input: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c == '(' {
            tokens.push(Token::LParen);
            i += 1;
        } else if c == ')' {
            tokens.push(Token::RParen);
            i += 1;
        } else if c == ',' {
            tokens.push(Token::Comma);
            i += 1;
        } else if c == '"' {
            let start = i + 1;
            let mut j = start;
            while j < chars.len() && chars[j] != '"' {
                j += 1;
            }
            if j >= chars.len() {
                return Err(Error::search("unterminated phrase literal"));
            }
            let phrase_text: String = chars[start..j].iter().collect();
            let words = phrase_text
                .split_whitespace()
                .map(|s| s.to_string())
                .collect();
            tokens.push(Token::Phrase(words));
            i = j + 1;
        } else if c == '#' {
            let start = i + 1;
            let mut j = start;
            while j < chars.len() && chars[j].is_ascii_digit() {
                j += 1;
            }
            if j == start {
                return Err(Error::search("expected digits after '#' in proximity query"));
            }
            let distance: u32 = chars[start..j]
                .iter()
                .collect::<String>()
                .parse()
                .map_err(|_| Error::search("invalid proximity distance"))?;
            tokens.push(Token::ProximityStart(distance));
            i = j;
        } else if c.is_alphanumeric() || c == '_' || c == ':' {
            let start = i;
            let mut j = i;
            while j < chars.len()
                && (chars[j].is_alphanumeric() || chars[j] == '_' || chars[j] == ':')
            {
                j += 1;
            }
            let word: String = chars[start..j].iter().collect();
            tokens.push(match word.as_str() {
                "AND" => Token::And,
                "OR" => Token::Or,
                "NOT" => Token::Not,
                _ => Token::Term(word),
            });
            i = j;
        } else {
            i += 1;
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Set when a phrase, proximity clause, explicit AND/OR/NOT, or
    /// parenthesis is encountered — disqualifies the query from collapsing
    /// into `Natural` mode.
    saw_explicit_operator: bool,
    bare_terms: Vec<String>,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Parser {
            tokens,
            pos: 0,
            saw_explicit_operator: false,
            bare_terms: Vec::new(),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn expect(&mut self, expected: &Token) -> Result<()> {
        match self.advance() {
            Some(ref t) if t == expected => Ok(()),
            other => Err(Error::search(format!(
                "expected {:?}, found {:?}",
                expected, other
            ))),
        }
    }

    // or := and (OR and)*
    fn parse_or(&mut self) -> Result<QueryNode> {
        let mut node = self.parse_and()?;
        while matches!(self.peek(), Some(Token::Or)) {
            self.saw_explicit_operator = true;
            self.advance();
            let rhs = self.parse_and()?;
            node = QueryNode::or(node, rhs);
        }
        Ok(node)
    }

    // and := not (AND not | not)*    -- juxtaposition implies AND
    fn parse_and(&mut self) -> Result<QueryNode> {
        let mut node = self.parse_not()?;
        loop {
            match self.peek() {
                Some(Token::And) => {
                    self.saw_explicit_operator = true;
                    self.advance();
                    let rhs = self.parse_not()?;
                    node = QueryNode::and(node, rhs);
                }
                Some(Token::Term(_))
                | Some(Token::Phrase(_))
                | Some(Token::ProximityStart(_))
                | Some(Token::Not)
                | Some(Token::LParen) => {
                    let rhs = self.parse_not()?;
                    node = QueryNode::and(node, rhs);
                }
                _ => break,
            }
        }
        Ok(node)
    }

    // not := NOT atom | atom
    fn parse_not(&mut self) -> Result<QueryNode> {
        if matches!(self.peek(), Some(Token::Not)) {
            self.saw_explicit_operator = true;
            self.advance();
            let inner = self.parse_atom()?;
            return Ok(QueryNode::not(inner));
        }
        self.parse_atom()
    }

    // atom := '(' or ')' | phrase | proximity | term
    fn parse_atom(&mut self) -> Result<QueryNode> {
        match self.advance() {
            Some(Token::LParen) => {
                self.saw_explicit_operator = true;
                let node = self.parse_or()?;
                self.expect(&Token::RParen)?;
                Ok(node)
            }
            Some(Token::Phrase(words)) => {
                self.saw_explicit_operator = true;
                Ok(QueryNode::Phrase(words))
            }
            Some(Token::ProximityStart(distance)) => {
                self.saw_explicit_operator = true;
                self.expect(&Token::LParen)?;
                let a = self.parse_term_word()?;
                self.expect(&Token::Comma)?;
                let b = self.parse_term_word()?;
                self.expect(&Token::RParen)?;
                Ok(QueryNode::Proximity(distance, a, b))
            }
            Some(Token::Term(word)) => {
                self.bare_terms.push(word.clone());
                Ok(QueryNode::Term(word))
            }
            other => Err(Error::search(format!("unexpected token: {:?}", other))),
        }
    }

    fn parse_term_word(&mut self) -> Result<String> {
        match self.advance() {
            Some(Token::Term(word)) => Ok(word),
            other => Err(Error::search(format!(
                "expected term inside proximity clause, found {:?}",
                other
            ))),
        }
    }
}

/// Parses a query string into a `QueryNode` tree. A bare multi-token query
/// with no explicit `AND`/`OR`/`NOT`, quotes, proximity clause, or
/// parenthesis collapses into `Natural` (spec §3 Query AST, §4.6).
pub fn parse_query(input: &str) -> Result<QueryNode> {
    let tokens = lex(input)?;
    if tokens.is_empty() {
        return Ok(QueryNode::Natural(Vec::new()));
    }

    let mut parser = Parser::new(tokens);
    let node = parser.parse_or()?;
    if parser.pos != parser.tokens.len() {
        return Err(Error::search("unexpected trailing tokens in query"));
    }

    if !parser.saw_explicit_operator && parser.bare_terms.len() >= 2 {
        return Ok(QueryNode::Natural(parser.bare_terms));
    }
    Ok(node)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_term_is_a_term_node() {
        assert_eq!(parse_query("quick").unwrap(), QueryNode::Term("quick".to_string()));
    }

    #[test]
    fn bare_juxtaposition_becomes_natural() {
        let node = parse_query("quick brown fox").unwrap();
        assert_eq!(
            node,
            QueryNode::Natural(vec![
                "quick".to_string(),
                "brown".to_string(),
                "fox".to_string()
            ])
        );
    }

    #[test]
    fn explicit_and_stays_boolean() {
        let node = parse_query("quick AND brown").unwrap();
        assert_eq!(
            node,
            QueryNode::and(
                QueryNode::Term("quick".to_string()),
                QueryNode::Term("brown".to_string())
            )
        );
    }

    #[test]
    fn phrase_literal() {
        let node = parse_query("\"quick brown\"").unwrap();
        assert_eq!(
            node,
            QueryNode::Phrase(vec!["quick".to_string(), "brown".to_string()])
        );
    }

    #[test]
    fn proximity_clause() {
        let node = parse_query("#2(quick,dogs)").unwrap();
        assert_eq!(
            node,
            QueryNode::Proximity(2, "quick".to_string(), "dogs".to_string())
        );
    }

    #[test]
    fn not_binds_tighter_than_and() {
        let node = parse_query("quick AND NOT brown").unwrap();
        assert_eq!(
            node,
            QueryNode::and(
                QueryNode::Term("quick".to_string()),
                QueryNode::not(QueryNode::Term("brown".to_string()))
            )
        );
    }

    #[test]
    fn or_has_lower_precedence_than_and() {
        let node = parse_query("a OR b AND c").unwrap();
        assert_eq!(
            node,
            QueryNode::or(
                QueryNode::Term("a".to_string()),
                QueryNode::and(QueryNode::Term("b".to_string()), QueryNode::Term("c".to_string()))
            )
        );
    }

    #[test]
    fn faceted_term_keeps_its_colon() {
        let node = parse_query("subject:cs").unwrap();
        assert_eq!(node, QueryNode::Term("subject:cs".to_string()));
    }
}
