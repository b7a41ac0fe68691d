// Stream manifest resolution, signature decoding and resumable delivery
pub mod cipher;
pub mod config;
pub mod cookies;
pub mod delivery;
pub mod error;
pub mod js_engine;
pub mod media;
pub mod proxy;
pub mod resolver;
pub mod utils;

// Export common types for ease of use
pub use cipher::{
    CipherDecoder, CipherError, CipherOptions, CustomEvaluator, Evaluator, EvaluatorBackend,
    get_cipher_function,
};
pub use config::{DEFAULT_USER_AGENT, RequestOptions};
pub use cookies::CookieJar;
pub use delivery::{
    Begin, ByteStream, DeliveryEngine, DeliverySession, ResumePolicy, SegmentedStreamer,
    SessionProgress, StreamOptions, TransportMode, open_stream,
};
pub use error::Error;
pub use media::{PlayerRef, RenditionDescriptor, StreamManifest};
pub use proxy::{ProxyAuth, ProxyConfig, ProxyType};
pub use resolver::{FormatResolver, RenditionFilter, ResolveOptions, expand_hls_manifest, resolve};
pub use utils::{
    is_audio_codec, is_dash_content_url, is_hls_content_url, is_live_content_url, is_video_codec,
};
