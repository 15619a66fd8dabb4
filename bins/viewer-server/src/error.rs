#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("config ({context}): {detail}")]
    Config { context: &'static str, detail: String },

    #[error("no {0} configured")]
    NoComponents(&'static str),

    #[error("load: {0}")]
    Load(#[from] viewer_engine::LoadError),

    #[error("register: {0}")]
    Register(#[from] viewer_engine::RegisterError),

    #[error("{0}")]
    Api(#[from] viewer_api_server::ApiServerError),

    #[error("signal: {0}")]
    Signal(#[from] std::io::Error),
}
