/// Client builder using the kargo-render user agent, used to identify
/// kargo-render to the pull-request hosts.
pub fn http_client_builder() -> reqwest::ClientBuilder {
    let user_agent = format!("kargo-render/{}", env!("CARGO_PKG_VERSION"));
    reqwest::Client::builder().user_agent(user_agent)
}
