/// Error returned by the rendering core.
///
/// Variants are coarse on purpose: callers branch on the kind (for CI
/// alerting or manual rescue), while the wrapped source carries the
/// contextual message chain.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// The request was malformed. Nothing was executed.
    #[error("invalid render request: {0}")]
    Validation(String),

    /// The repository configuration could not be loaded, parsed, or
    /// schema-validated. Nothing was executed.
    #[error("invalid repository configuration: {0}")]
    Config(String),

    /// A git operation failed.
    #[error("git operation failed")]
    Git(#[source] anyhow::Error),

    /// Manifest generation or the last-mile transformation failed for an app.
    #[error("error rendering manifests for app {app}")]
    Render {
        app: String,
        #[source]
        source: anyhow::Error,
    },

    /// Opening or updating the pull request failed.
    #[error("pull request error")]
    Pr(#[source] anyhow::Error),

    /// A filesystem operation failed.
    #[error("io error")]
    Io(#[source] anyhow::Error),

    /// The target branch pre-exists with content but carries no kargo-render
    /// metadata, so taking it over could destroy someone else's work.
    #[error(
        "branch {branch} already exists and does not appear to be managed by kargo-render; \
         refusing to adopt it"
    )]
    BranchNotManaged { branch: String },

    /// Every app rendered to nothing and the request did not allow an empty
    /// result.
    #[error("rendered result is empty and the request does not allow empty results")]
    EmptyResult,

    /// The ambient cancellation token fired between stages.
    #[error("the render operation was cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, RenderError>;
