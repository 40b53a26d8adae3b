use crate::config::session::ServiceConfig;

pub fn initiate_default_values(mut config: ServiceConfig) -> ServiceConfig {
    config.settings.base_url = config.settings.base_url.trim().trim_end_matches('/').to_owned();

    let session = &mut config.session;
    session.public_routes = session
        .public_routes
        .iter()
        .map(|route| route.trim().to_owned())
        .filter(|route| !route.is_empty())
        .collect();

    // login must never carry a stale bearer token
    let login_route = session.login_route.to_owned();
    if !session
        .public_routes
        .iter()
        .any(|route| login_route.contains(route.as_str()))
    {
        session.public_routes.push(login_route);
    }

    config
}
