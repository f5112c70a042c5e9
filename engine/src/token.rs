//! Plan tokens: the typed form of a wire plan string.
//!
//! A plan is stored internally as `Vec<Token>` and only rendered to the
//! `{0..5, [0..3]}` wire alphabet at the oracle boundary — see §4.C5 /
//! §6 of the design: "string-based plan manipulation" in the source is
//! replaced here with a typed sequence, encoded/decoded once.

/// One step of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    /// Move through door `0..=5`.
    Move(u8),
    /// Overwrite the label observed at the current position with `0..=3`,
    /// without advancing the cursor.
    Charcoal(u8),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("byte {pos}: '{ch}' is not a move digit (0-5) or '['")]
    UnexpectedByte { pos: usize, ch: char },
    #[error("byte {pos}: charcoal marker missing closing ']'")]
    UnterminatedMarker { pos: usize },
    #[error("byte {pos}: '{ch}' is not a valid charcoal label (0-3)")]
    BadCharcoalLabel { pos: usize, ch: char },
    #[error("position {position}: charcoal marker applied twice before any move")]
    DoubleCharcoal { position: usize },
    #[error("move length {len} exceeds the budget of {limit} (18*N)")]
    OverBudget { len: usize, limit: usize },
}

/// Parse a wire plan string into tokens, validating move digits and
/// charcoal marker syntax. Does not enforce the length budget — callers
/// that care (the exploration loop) check that separately with
/// [`move_count`].
pub fn decode(plan: &str) -> Result<Vec<Token>, DecodeError> {
    let bytes: Vec<char> = plan.chars().collect();
    let mut tokens = Vec::with_capacity(bytes.len());
    let mut i = 0usize;
    let mut charcoaled_since_last_move = false;
    let mut position = 0usize;

    while i < bytes.len() {
        let ch = bytes[i];
        match ch {
            '0'..='5' => {
                tokens.push(Token::Move(ch as u8 - b'0'));
                i += 1;
                position += 1;
                charcoaled_since_last_move = false;
            }
            '[' => {
                if charcoaled_since_last_move {
                    return Err(DecodeError::DoubleCharcoal { position });
                }
                let label_idx = i + 1;
                let close_idx = i + 2;
                let label_ch = *bytes
                    .get(label_idx)
                    .ok_or(DecodeError::UnterminatedMarker { pos: i })?;
                if !('0'..='3').contains(&label_ch) {
                    return Err(DecodeError::BadCharcoalLabel {
                        pos: label_idx,
                        ch: label_ch,
                    });
                }
                if bytes.get(close_idx) != Some(&']') {
                    return Err(DecodeError::UnterminatedMarker { pos: i });
                }
                tokens.push(Token::Charcoal(label_ch as u8 - b'0'));
                i += 3;
                charcoaled_since_last_move = true;
            }
            other => {
                return Err(DecodeError::UnexpectedByte { pos: i, ch: other });
            }
        }
    }
    Ok(tokens)
}

/// Render tokens back to the wire alphabet.
pub fn encode(tokens: &[Token]) -> String {
    let mut s = String::with_capacity(tokens.len());
    for t in tokens {
        match t {
            Token::Move(d) => s.push(char::from(b'0' + d)),
            Token::Charcoal(l) => {
                s.push('[');
                s.push(char::from(b'0' + l));
                s.push(']');
            }
        }
    }
    s
}

/// Number of move tokens — what counts against the `18*N` plan budget.
pub fn move_count(tokens: &[Token]) -> usize {
    tokens
        .iter()
        .filter(|t| matches!(t, Token::Move(_)))
        .count()
}

/// Check a plan's move-token count against the budget, returning the
/// `Decode` variant used for a plan that's too long to submit.
pub fn check_budget(tokens: &[Token], limit: usize) -> Result<(), DecodeError> {
    let len = move_count(tokens);
    if len > limit {
        Err(DecodeError::OverBudget { len, limit })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_moves_and_charcoal() {
        let plan = "01[2]34";
        let tokens = decode(plan).unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Move(0),
                Token::Move(1),
                Token::Charcoal(2),
                Token::Move(3),
                Token::Move(4),
            ]
        );
        assert_eq!(encode(&tokens), plan);
        assert_eq!(move_count(&tokens), 4);
    }

    #[test]
    fn leading_charcoal_is_legal() {
        // §9 open question: a charcoal marker before any move overrides
        // the starting-position label.
        let tokens = decode("[3]012").unwrap();
        assert_eq!(tokens[0], Token::Charcoal(3));
        assert_eq!(move_count(&tokens), 3);
    }

    #[test]
    fn double_charcoal_before_move_is_an_error() {
        let err = decode("[1][2]0").unwrap_err();
        assert_eq!(err, DecodeError::DoubleCharcoal { position: 0 });
    }

    #[test]
    fn invalid_charcoal_label_is_rejected() {
        // Seed test #6: `01[5]2` must be rejected with Decode.
        let err = decode("01[5]2").unwrap_err();
        assert_eq!(
            err,
            DecodeError::BadCharcoalLabel { pos: 3, ch: '5' }
        );
    }

    #[test]
    fn unterminated_marker_is_rejected() {
        assert!(matches!(
            decode("01[2"),
            Err(DecodeError::UnterminatedMarker { pos: 2 })
        ));
    }

    #[test]
    fn budget_check() {
        let tokens = decode("012345").unwrap();
        assert!(check_budget(&tokens, 6).is_ok());
        assert_eq!(
            check_budget(&tokens, 5).unwrap_err(),
            DecodeError::OverBudget { len: 6, limit: 5 }
        );
    }
}
