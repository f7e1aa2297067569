pub mod pcm;
pub mod rate_limiter;
