/*
 * Responsibility
 * - middleware の公開インターフェース
 * - 認可は middleware ではなく AccessPipeline (handler 側) で行う
 */
pub mod cors;
pub mod http;
pub mod security_headers;
