//! User-facing text in English and Chinese.
//!
//! Every [`MessageKey`] is matched exhaustively for every [`Language`], so a
//! missing translation is a compile error rather than a raw key on screen.

use serde::{Deserialize, Serialize};

use crate::wizard::{Notice, Step};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Zh,
}

impl Language {
    /// Unknown codes fall back to English.
    pub fn from_code(code: &str) -> Self {
        let code = code.trim().to_ascii_lowercase();
        if code == "zh" || code.starts_with("zh-") || code.starts_with("zh_") {
            Self::Zh
        } else {
            Self::En
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKey {
    StepConnectWallet,
    StepIdentifier,
    StepGenerateWallet,
    StepFunding,
    StepRelease,
    StepReleased,
    ConnectWallet,
    WalletUnavailable,
    WrongNetwork,
    WalletConnected,
    EnterIdentifier,
    InvalidIdentifier,
    CheckingIdentifier,
    IdentifierAvailable,
    AlreadyRegistered,
    ExistenceCheckFailed,
    GenerateWallet,
    WaitingForFunds,
    FundsConfirmed,
    Irreversible,
    SubmissionPending,
    SubmissionFailed,
    Released,
}

pub fn t(lang: Language, key: MessageKey) -> &'static str {
    use MessageKey::*;
    match lang {
        Language::En => match key {
            StepConnectWallet => "Connect Wallet",
            StepIdentifier => "Identifier",
            StepGenerateWallet => "Generate Wallet",
            StepFunding => "Funding",
            StepRelease => "Release",
            StepReleased => "Released",
            ConnectWallet => "Connect your wallet to begin",
            WalletUnavailable => "Wallet unavailable",
            WrongNetwork => "Please switch to the required network",
            WalletConnected => "Wallet connected",
            EnterIdentifier => "Paste your identifier (format: arweave_id::hash)",
            InvalidIdentifier => "Invalid identifier format, expected arweave_id::hash",
            CheckingIdentifier => "Checking...",
            IdentifierAvailable => "Valid - available for registration",
            AlreadyRegistered => "This identifier is already registered",
            ExistenceCheckFailed => "Could not check the registry, edit the identifier to retry",
            GenerateWallet => "Generate a new wallet to act as your AI agent's identity",
            WaitingForFunds => "Waiting for funds...",
            FundsConfirmed => "Funds confirmed",
            Irreversible => "This action is irreversible. Type CONFIRM to release",
            SubmissionPending => "Processing...",
            SubmissionFailed => "Release failed, type CONFIRM again to retry",
            Released => "Released successfully!",
        },
        Language::Zh => match key {
            StepConnectWallet => "连接钱包",
            StepIdentifier => "标识符",
            StepGenerateWallet => "生成钱包",
            StepFunding => "资金",
            StepRelease => "释放",
            StepReleased => "已释放",
            ConnectWallet => "请连接钱包以开始",
            WalletUnavailable => "钱包不可用",
            WrongNetwork => "请切换至所需网络",
            WalletConnected => "钱包已连接",
            EnterIdentifier => "粘贴您的标识符 (格式: arweave_id::hash)",
            InvalidIdentifier => "标识符格式错误，应为: arweave_id::hash",
            CheckingIdentifier => "检查中...",
            IdentifierAvailable => "有效 - 可以注册",
            AlreadyRegistered => "此标识符已被使用",
            ExistenceCheckFailed => "无法查询注册表，请修改标识符后重试",
            GenerateWallet => "将创建一个新的以太坊钱包作为您的 AI 代理身份",
            WaitingForFunds => "等待资金到账...",
            FundsConfirmed => "资金确认",
            Irreversible => "此操作不可逆，输入 CONFIRM 确认释放",
            SubmissionPending => "处理中...",
            SubmissionFailed => "释放失败，请重新输入 CONFIRM 重试",
            Released => "释放成功!",
        },
    }
}

pub fn step_label(lang: Language, step: Step) -> &'static str {
    let key = match step {
        Step::ConnectWallet => MessageKey::StepConnectWallet,
        Step::SubmitIdentifier => MessageKey::StepIdentifier,
        Step::GenerateWallet => MessageKey::StepGenerateWallet,
        Step::FundWallet => MessageKey::StepFunding,
        Step::ConfirmRelease => MessageKey::StepRelease,
        Step::Released => MessageKey::StepReleased,
    };
    t(lang, key)
}

impl Notice {
    pub fn key(&self) -> MessageKey {
        match self {
            Notice::ConnectWallet => MessageKey::ConnectWallet,
            Notice::WalletUnavailable { .. } => MessageKey::WalletUnavailable,
            Notice::WrongNetwork { .. } => MessageKey::WrongNetwork,
            Notice::WalletConnected => MessageKey::WalletConnected,
            Notice::EnterIdentifier => MessageKey::EnterIdentifier,
            Notice::InvalidIdentifier { .. } => MessageKey::InvalidIdentifier,
            Notice::CheckingIdentifier => MessageKey::CheckingIdentifier,
            Notice::IdentifierAvailable => MessageKey::IdentifierAvailable,
            Notice::AlreadyRegistered => MessageKey::AlreadyRegistered,
            Notice::ExistenceCheckFailed { .. } => MessageKey::ExistenceCheckFailed,
            Notice::GenerateWallet => MessageKey::GenerateWallet,
            Notice::WaitingForFunds => MessageKey::WaitingForFunds,
            Notice::FundsConfirmed => MessageKey::FundsConfirmed,
            Notice::Irreversible => MessageKey::Irreversible,
            Notice::SubmissionPending => MessageKey::SubmissionPending,
            Notice::SubmissionFailed { .. } => MessageKey::SubmissionFailed,
            Notice::Released => MessageKey::Released,
        }
    }

    /// Translated text, with any detail appended.
    pub fn render(&self, lang: Language) -> String {
        let text = t(lang, self.key());
        match self {
            Notice::WalletUnavailable { reason }
            | Notice::InvalidIdentifier { reason }
            | Notice::ExistenceCheckFailed { reason }
            | Notice::SubmissionFailed { reason } => format!("{text} ({reason})"),
            Notice::WrongNetwork { expected, actual } => {
                format!("{text} (Chain ID: {expected}, current: {actual})")
            }
            _ => text.to_string(),
        }
    }
}
