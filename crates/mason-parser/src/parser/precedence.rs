//! Binary operator precedence table.

use crate::ast::BinaryOp;
use crate::token::TokenType;

/// Lowest rank handed to `parse_binary` by expression entry points.
pub(crate) const BASE_RANK: u8 = 1;

/// Rank and operator for a token in binary-operator position.
///
/// `is`/`in` with a `not` particle are resolved by the caller before the
/// table is consulted.
pub(crate) fn binary_rank(ty: TokenType) -> Option<(u8, BinaryOp)> {
    use TokenType::*;

    let entry = match ty {
        Or => (1, BinaryOp::LogicalOr),
        And => (2, BinaryOp::LogicalAnd),
        Equal => (3, BinaryOp::Equal),
        NotEqual => (3, BinaryOp::NotEqual),
        Less => (4, BinaryOp::Less),
        LessOrEqual => (4, BinaryOp::LessOrEqual),
        Greater => (4, BinaryOp::Greater),
        GreaterOrEqual => (4, BinaryOp::GreaterOrEqual),
        Is => (4, BinaryOp::Is),
        In => (4, BinaryOp::In),
        BitOr => (5, BinaryOp::BitOr),
        BitXor => (6, BinaryOp::BitXor),
        BitAnd => (7, BinaryOp::BitAnd),
        LeftShift => (8, BinaryOp::LeftShift),
        RightShift => (8, BinaryOp::RightShift),
        Add => (9, BinaryOp::Add),
        Sub => (9, BinaryOp::Sub),
        Mul => (10, BinaryOp::Mul),
        Div => (10, BinaryOp::Div),
        Mod => (10, BinaryOp::Mod),
        _ => return Option::None,
    };
    Some(entry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_ordering() {
        let (or_rank, _) = binary_rank(TokenType::Or).unwrap();
        let (and_rank, _) = binary_rank(TokenType::And).unwrap();
        let (add_rank, _) = binary_rank(TokenType::Add).unwrap();
        let (mul_rank, _) = binary_rank(TokenType::Mul).unwrap();
        assert!(or_rank < and_rank);
        assert!(add_rank < mul_rank);
    }

    #[test]
    fn test_non_operators() {
        assert!(binary_rank(TokenType::Comma).is_none());
        assert!(binary_rank(TokenType::Assign).is_none());
    }
}
