//! Shared hyper client for remote tool servers.

use std::sync::Arc;
use std::time::Duration;

use hyper::client::HttpConnector;
use hyper::{Body, Client};
use hyper_rustls::HttpsConnector;
use rustls::{ClientConfig, OwnedTrustAnchor, RootCertStore};

pub(crate) type RemoteClient = Client<HttpsConnector<HttpConnector>, Body>;

/// Idle keep-alive connections to a tool server are dropped after this long.
const POOL_IDLE: Duration = Duration::from_secs(90);

fn mozilla_roots() -> RootCertStore {
    let mut store = RootCertStore::empty();
    let anchors = webpki_roots::TLS_SERVER_ROOTS.iter().map(|root| {
        OwnedTrustAnchor::from_subject_spki_name_constraints(root.subject, root.spki, root.name_constraints)
    });
    store.add_trust_anchors(anchors);
    store
}

/// Client for `http://` and `https://` endpoints alike.
pub(crate) fn remote_client() -> RemoteClient {
    let tls = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(mozilla_roots())
        .with_no_client_auth();

    let mut plain = HttpConnector::new();
    plain.enforce_http(false);
    plain.set_nodelay(true);

    Client::builder()
        .pool_idle_timeout(POOL_IDLE)
        .build(HttpsConnector::from((plain, Arc::new(tls))))
}
