use server_api::ApiContext;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) api: ApiContext,
    /// `s-maxage` and `stale-while-revalidate` for the public page payload.
    pub(crate) cache_max_age_seconds: u64,
}
