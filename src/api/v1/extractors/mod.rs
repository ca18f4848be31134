pub mod fapi_ctx;

pub use fapi_ctx::FapiCtx;
