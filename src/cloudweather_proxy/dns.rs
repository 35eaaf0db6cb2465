// cloudweather_proxy - Local receiver and forwarder for weather station uploads
//
// Copyright 2024 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use hyper::client::connect::dns::Name;
use reqwest::dns::{Addrs, Resolve, Resolving};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

pub const DEFAULT_DNS_SERVER: IpAddr = IpAddr::V4(Ipv4Addr::new(9, 9, 9, 9));
const DNS_PORT: u16 = 53;

/// Resolver for outbound requests that only asks the given nameservers.
///
/// Stations are usually configured with fixed vendor hostnames that a local
/// resolver might override (to point them at this proxy, for example), so
/// forwarded requests must not use the host's resolver.
#[derive(Clone)]
pub struct NameserverResolver {
    servers: Vec<IpAddr>,
    resolver: TokioAsyncResolver,
}

impl NameserverResolver {
    /// Create a resolver for `servers`, falling back to the default if the list is empty.
    pub fn new(servers: &[IpAddr]) -> Self {
        let servers = if servers.is_empty() {
            vec![DEFAULT_DNS_SERVER]
        } else {
            servers.to_vec()
        };

        let group = NameServerConfigGroup::from_ips_clear(&servers, DNS_PORT, true);
        let config = ResolverConfig::from_parts(None, vec![], group);
        let resolver = TokioAsyncResolver::tokio(config, ResolverOpts::default());

        NameserverResolver { servers, resolver }
    }

    pub fn servers(&self) -> &[IpAddr] {
        &self.servers
    }
}

impl std::fmt::Debug for NameserverResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NameserverResolver").field("servers", &self.servers).finish()
    }
}

impl Resolve for NameserverResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let resolver = self.resolver.clone();
        Box::pin(async move {
            let lookup = resolver.lookup_ip(name.as_str()).await?;
            tracing::debug!(message = "resolved forwarding host", host = name.as_str());
            // Port is replaced by reqwest with the one from the URL.
            let addrs: Vec<SocketAddr> = lookup.iter().map(|ip| SocketAddr::new(ip, 0)).collect();
            let addrs: Addrs = Box::new(addrs.into_iter());
            Ok(addrs)
        })
    }
}
