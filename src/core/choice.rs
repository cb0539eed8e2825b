//! 用户选项：表面 token "1" / "2" 在边界处转换为枚举

use crate::core::StepError;

/// 步骤 2/4/5 的二元选择
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    /// 未提供（或空串）
    Absent,
    /// "1"
    Accept,
    /// "2"
    Reject,
}

impl Choice {
    pub const ACCEPT_TOKEN: &'static str = "1";
    pub const REJECT_TOKEN: &'static str = "2";

    /// 解析表面 token；两者之外的值为 InvalidChoice
    pub fn parse(raw: Option<&str>) -> Result<Self, StepError> {
        match raw.map(str::trim) {
            None | Some("") => Ok(Choice::Absent),
            Some(Self::ACCEPT_TOKEN) => Ok(Choice::Accept),
            Some(Self::REJECT_TOKEN) => Ok(Choice::Reject),
            Some(other) => Err(StepError::InvalidChoice(other.to_string())),
        }
    }

    pub fn is_accept(self) -> bool {
        self == Choice::Accept
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tokens() {
        assert_eq!(Choice::parse(None).unwrap(), Choice::Absent);
        assert_eq!(Choice::parse(Some(" ")).unwrap(), Choice::Absent);
        assert_eq!(Choice::parse(Some("1")).unwrap(), Choice::Accept);
        assert_eq!(Choice::parse(Some(" 2 ")).unwrap(), Choice::Reject);
    }

    #[test]
    fn test_unknown_token_is_invalid() {
        assert_eq!(
            Choice::parse(Some("x")),
            Err(StepError::InvalidChoice("x".to_string()))
        );
    }
}
