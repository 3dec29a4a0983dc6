use std::fmt;
use std::net::SocketAddr;

/// Direction-aware identity of one TCP conversation.
///
/// The whole endpoint tuple is the key, so two different flows can never
/// alias each other; hashing only indexes the tracker map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowKey {
    pub client: SocketAddr,
    pub server: SocketAddr,
}

impl FlowKey {
    pub fn identify(src: SocketAddr, dst: SocketAddr) -> Self {
        FlowKey {
            client: src,
            server: dst,
        }
    }

    /// Key of a request travelling client -> server.
    pub fn of_request(src: SocketAddr, dst: SocketAddr) -> Self {
        Self::identify(src, dst)
    }

    /// Key of a response travelling server -> client: the response's
    /// destination is the original request's source.
    pub fn of_response(src: SocketAddr, dst: SocketAddr) -> Self {
        Self::identify(dst, src)
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.client, self.server)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    #[test]
    fn response_key_mirrors_request_key() {
        let client = addr("10.0.0.1:51000");
        let server = addr("93.184.216.34:80");

        let request = FlowKey::of_request(client, server);
        let response = FlowKey::of_response(server, client);
        assert_eq!(request, response);
        assert_eq!(request.client, client);
    }

    #[test]
    fn direction_matters() {
        let a = addr("10.0.0.1:51000");
        let b = addr("10.0.0.2:80");
        assert_ne!(FlowKey::identify(a, b), FlowKey::identify(b, a));
    }

    #[test]
    fn ipv6_endpoints_display_with_brackets() {
        let key = FlowKey::identify(addr("[::1]:40000"), addr("[2001:db8::1]:8080"));
        assert_eq!(key.to_string(), "[::1]:40000->[2001:db8::1]:8080");
    }
}
