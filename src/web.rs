use crate::{
    annotate::OllamaCaptioner,
    config::Config,
    gallery::{ImageRecord, RecordPatch, SearchHit},
    semantic::{Embedder, EmbeddingModel, VECTOR_DIR},
    session::{GalleryError, Session},
};
use axum::{
    extract::{Path as UrlPath, State},
    http::header,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio::{signal, sync::RwLock};

/// Daemon state: the loaded config, the lazily-built embedding model, and
/// the currently open folder. One folder at a time; opening another one
/// replaces the session.
struct Daemon {
    config: Config,
    base_path: String,
    embedder: Option<Arc<dyn Embedder>>,
    session: Option<Session>,
}

impl Daemon {
    /// Build the embedding model on first use; the download can take a
    /// while and the daemon should come up without it.
    fn ensure_embedder(&mut self) -> Result<Arc<dyn Embedder>, GalleryError> {
        if let Some(embedder) = &self.embedder {
            return Ok(embedder.clone());
        }

        let timeout = Duration::from_secs(self.config.semantic.download_timeout_secs);
        let model = EmbeddingModel::new(
            &self.config.semantic.model,
            PathBuf::from(&self.base_path),
            Some(timeout),
        )
        .map_err(|err| GalleryError::Vector(err.into()))?;

        let embedder: Arc<dyn Embedder> = Arc::new(model);
        self.embedder = Some(embedder.clone());
        Ok(embedder)
    }

    fn session(&self) -> Result<&Session, GalleryError> {
        self.session.as_ref().ok_or(GalleryError::NoFolderOpen)
    }

    fn session_mut(&mut self) -> Result<&mut Session, GalleryError> {
        self.session.as_mut().ok_or(GalleryError::NoFolderOpen)
    }

    fn captioner(&self) -> Result<OllamaCaptioner, GalleryError> {
        OllamaCaptioner::new(&self.config.captioner).map_err(GalleryError::Annotation)
    }
}

type SharedState = Arc<RwLock<Daemon>>;

async fn start_app(config: Config, base_path: String) {
    let daemon = Arc::new(RwLock::new(Daemon {
        config,
        base_path,
        embedder: None,
        session: None,
    }));

    async fn shutdown_signal() {
        let ctrl_c = async {
            signal::ctrl_c()
                .await
                .expect("failed to install Ctrl+C handler");
        };

        let terminate = async {
            signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("failed to install signal handler")
                .recv()
                .await;
        };

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    }

    let app = Router::new()
        .route("/api/folder/open", post(open_folder))
        .route("/api/images", get(list_images))
        .route("/api/image/*path", get(serve_image))
        .route("/api/search", post(search))
        .route("/api/annotate", post(annotate_image))
        .route("/api/metadata/update", post(update_metadata))
        .route("/api/status", get(status))
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(
                    tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
                )
                .on_response(
                    tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO),
                ),
        )
        .with_state(daemon);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:8001").await.unwrap();
    log::info!("listening on 127.0.0.1:8001");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();
}

pub fn start_daemon(config: Config, base_path: String) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(async { start_app(config, base_path).await });
}

// Wrapper so `?` works on handler-internal results.
#[derive(Debug)]
struct HttpError(GalleryError);

impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        match self.0 {
            GalleryError::FolderNotFound(_)
            | GalleryError::ImageNotFound(_)
            | GalleryError::MetadataNotFound(_) => (
                axum::http::StatusCode::NOT_FOUND,
                json!({"error": self.0.to_string()}).to_string(),
            ),
            GalleryError::NoFolderOpen => (
                axum::http::StatusCode::BAD_REQUEST,
                json!({"error": self.0.to_string()}).to_string(),
            ),
            GalleryError::Annotation(_) => {
                log::error!("{self:?}");
                (
                    axum::http::StatusCode::BAD_GATEWAY,
                    json!({"error": self.0.to_string()}).to_string(),
                )
            }
            GalleryError::Store(_) | GalleryError::Vector(_) | GalleryError::Io(_) => {
                log::error!("{self:?}");
                (
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    json!({"error": self.0.to_string()}).to_string(),
                )
            }
        }
        .into_response()
    }
}

impl<E> From<E> for HttpError
where
    E: Into<GalleryError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[derive(Debug, Deserialize)]
struct OpenFolderRequest {
    folder_path: String,
}

#[derive(Debug, Serialize)]
struct ImagesResponse {
    images: Vec<SearchHit>,
}

async fn open_folder(
    State(state): State<SharedState>,
    Json(payload): Json<OpenFolderRequest>,
) -> Result<Json<ImagesResponse>, HttpError> {
    log::debug!("payload: {payload:?}");

    tokio::task::block_in_place(move || {
        let mut daemon = state.blocking_write();
        let embedder = daemon.ensure_embedder()?;
        let threshold = daemon.config.semantic.distance_threshold;

        let (session, snapshot) = Session::open(&payload.folder_path, embedder, threshold)?;
        daemon.session = Some(session);

        let images = snapshot
            .iter()
            .map(|(path, record)| SearchHit::hydrate(path, record))
            .collect();
        Ok(Json(ImagesResponse { images }))
    })
}

async fn list_images(
    State(state): State<SharedState>,
) -> Result<Json<ImagesResponse>, HttpError> {
    tokio::task::block_in_place(move || {
        let daemon = state.blocking_read();
        let images = daemon.session()?.list()?;
        Ok(Json(ImagesResponse { images }))
    })
}

async fn serve_image(
    State(state): State<SharedState>,
    UrlPath(path): UrlPath<String>,
) -> Result<impl IntoResponse, HttpError> {
    let full_path = {
        let daemon = state.read().await;
        daemon.session()?.image_path(&path)?
    };

    let bytes = tokio::fs::read(&full_path)
        .await
        .map_err(GalleryError::Io)?;

    Ok(([(header::CONTENT_TYPE, content_type(&path))], bytes))
}

fn content_type(path: &str) -> &'static str {
    match path.rsplit('.').next().map(|ext| ext.to_lowercase()) {
        Some(ext) if ext == "jpg" || ext == "jpeg" => "image/jpeg",
        Some(ext) if ext == "png" => "image/png",
        Some(ext) if ext == "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

#[derive(Debug, Deserialize)]
struct SearchRequest {
    #[serde(default)]
    query: String,
}

async fn search(
    State(state): State<SharedState>,
    Json(payload): Json<SearchRequest>,
) -> Result<Json<ImagesResponse>, HttpError> {
    log::debug!("payload: {payload:?}");

    tokio::task::block_in_place(move || {
        let daemon = state.blocking_read();
        let images = daemon.session()?.search(&payload.query)?;
        Ok(Json(ImagesResponse { images }))
    })
}

#[derive(Debug, Deserialize)]
struct AnnotateRequest {
    path: String,
}

#[derive(Debug, Serialize)]
struct AnnotateResponse {
    path: String,
    #[serde(flatten)]
    record: ImageRecord,
}

async fn annotate_image(
    State(state): State<SharedState>,
    Json(payload): Json<AnnotateRequest>,
) -> Result<Json<AnnotateResponse>, HttpError> {
    log::debug!("payload: {payload:?}");

    tokio::task::block_in_place(move || {
        let mut daemon = state.blocking_write();
        let captioner = daemon.captioner()?;
        let record = daemon.session_mut()?.annotate_image(&payload.path, &captioner)?;
        Ok(Json(AnnotateResponse {
            path: payload.path,
            record,
        }))
    })
}

#[derive(Debug, Deserialize)]
struct UpdateMetadataRequest {
    path: String,
    description: Option<String>,
    tags: Option<Vec<String>>,
    text_content: Option<String>,
}

async fn update_metadata(
    State(state): State<SharedState>,
    Json(payload): Json<UpdateMetadataRequest>,
) -> Result<Json<ImageRecord>, HttpError> {
    log::debug!("payload: {payload:?}");

    let patch = RecordPatch {
        description: payload.description,
        tags: payload.tags,
        text_content: payload.text_content,
    };

    tokio::task::block_in_place(move || {
        let mut daemon = state.blocking_write();
        let record = daemon.session_mut()?.update_metadata(&payload.path, patch)?;
        Ok(Json(record))
    })
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    folder: Option<String>,
    total: usize,
    indexed: usize,
    index_on_disk: bool,
}

async fn status(State(state): State<SharedState>) -> Result<Json<StatusResponse>, HttpError> {
    tokio::task::block_in_place(move || {
        let daemon = state.blocking_read();

        let response = match &daemon.session {
            Some(session) => StatusResponse {
                folder: Some(session.root().display().to_string()),
                total: session.snapshot().map(|s| s.len()).unwrap_or(0),
                indexed: session.indexed_count(),
                index_on_disk: session.root().join(VECTOR_DIR).exists(),
            },
            None => StatusResponse {
                folder: None,
                total: 0,
                indexed: 0,
                index_on_disk: false,
            },
        };

        Ok(Json(response))
    })
}
