//! Wire-level constants shared with dapps and the SDK.

/// Origin tag of a link opened directly on the device.
pub const ORIGIN_DEEPLINK: &str = "deeplink";
/// Origin tag of a link scanned from a QR code.
pub const ORIGIN_QR_CODE: &str = "qr-code";
/// Query marker a dapp adds to a universal link that carries QR intent.
pub const QRCODE_PARAM_PATTERN: &str = "&t=q";

/// `request_source` reported for WalletConnect v2 approvals.
pub const REQUEST_SOURCE_WC2: &str = "WalletConnectV2";

/// Error code for bridge-generated rejections.
pub const ERROR_CODE: i64 = 1;
pub const INVALID_CHAIN: &str = "Invalid chainId";
pub const MANUAL_DISCONNECT: &str = "Manual disconnect";
pub const INVALID_ID: &str = "Invalid Id";
pub const AUTO_REMOVED: &str = "auto removed";
pub const MANUAL_REJECT: &str = "manual reject";
