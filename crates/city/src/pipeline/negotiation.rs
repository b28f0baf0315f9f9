use crate::request::RequestContext;
use http::Method;
use http::header::ACCEPT;
use mime::Mime;

/// Whether a page request asks for the page data instead of the rendered document.
///
/// Only `GET` and `HEAD` qualify, and only when `Accept` lists `application/json` or a
/// `+json` suffixed type.
pub fn accepts_data(request: &RequestContext) -> bool {
    let method = request.method();
    if method != Method::GET && method != Method::HEAD {
        return false;
    }

    request
        .headers()
        .get_all(ACCEPT)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|item| item.trim().parse::<Mime>().ok())
        .any(|accepted| is_json(&accepted))
}

fn is_json(accepted: &Mime) -> bool {
    accepted.type_() == mime::APPLICATION && (accepted.subtype() == mime::JSON || accepted.suffix() == Some(mime::JSON))
}
