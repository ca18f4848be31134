/*!
 * FAPI request context extractor
 *
 * Responsibility:
 * - Open Finance リクエストのヘッダ (Authorization: DPoP / DPoP / FAPI / consent) を
 *   構文チェックして handler に渡す
 * - 暗号検証や consent 判定はしない (AccessPipeline の責務)
 *
 * Public API:
 * - FapiCtx
 */

mod core;
mod types;

pub use types::FapiCtx;
