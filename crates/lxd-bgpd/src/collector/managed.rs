//! Traversal of managed uplinks through tracked `used_by` relations

use super::{skip_entity, CandidateSource, CollectContext, RouteCandidate, TraversalStrategy};
use crate::error::Result;
use crate::topology::Network;
use crate::used_by::{parse_used_by, KIND_INSTANCES, KIND_NETWORKS};
use async_trait::async_trait;
use lxd_bgp_types::{AddressFamily, IpAddress, IpPrefix};
use tracing::{debug, warn};

/// Derives routes from downstream networks and the NICs attached to them.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManagedStrategy;

/// Per-family next-hops of a downstream network
#[derive(Debug, Clone, Copy, Default)]
struct NextHops {
    v4: Option<IpAddress>,
    v6: Option<IpAddress>,
}

impl NextHops {
    fn of(network: &Network) -> Self {
        Self {
            v4: parse_nexthop(network, AddressFamily::Ipv4),
            v6: parse_nexthop(network, AddressFamily::Ipv6),
        }
    }

    fn get(&self, family: AddressFamily) -> Option<IpAddress> {
        match family {
            AddressFamily::Ipv4 => self.v4,
            AddressFamily::Ipv6 => self.v6,
        }
    }
}

fn parse_nexthop(network: &Network, family: AddressFamily) -> Option<IpAddress> {
    let raw = network.tracked_nexthop(family)?;
    match raw.parse::<IpAddress>() {
        Ok(addr) if addr.family() == family => Some(addr),
        Ok(_) | Err(_) => {
            warn!(
                network = %network.name,
                family = %family,
                value = %raw,
                "Ignoring unusable tracked next-hop"
            );
            None
        }
    }
}

impl ManagedStrategy {
    pub fn new() -> Self {
        Self
    }

    async fn collect_network(
        &self,
        project: &str,
        network: &Network,
        ctx: &CollectContext<'_>,
        out: &mut Vec<RouteCandidate>,
    ) -> Result<()> {
        let nexthops = NextHops::of(network);

        // Families are handled in order; an unparseable subnet ends the
        // network here, keeping what was already emitted.
        for family in AddressFamily::ALL {
            let Some(raw) = network.exported_subnet(family) else {
                continue;
            };
            let subnet = match raw.parse::<IpPrefix>() {
                Ok(subnet) if subnet.family() == family => subnet,
                Ok(_) | Err(_) => {
                    warn!(
                        project = %project,
                        network = %network.name,
                        family = %family,
                        value = %raw,
                        "Skipping rest of network with unparseable subnet"
                    );
                    return Ok(());
                }
            };

            match nexthops.get(family) {
                Some(nexthop) => out.push(RouteCandidate::new(
                    subnet,
                    nexthop,
                    CandidateSource::Subnet {
                        project: project.to_string(),
                        network: network.name.clone(),
                    },
                )),
                None => debug!(
                    network = %network.name,
                    prefix = %subnet,
                    "No tracked next-hop for subnet"
                ),
            }
        }

        for (instance_project, names) in parse_used_by(&network.used_by, KIND_INSTANCES) {
            for name in names {
                let instance = match ctx.platform.get_instance(&instance_project, &name).await {
                    Ok(instance) => instance,
                    Err(e) => {
                        skip_entity(e, &format!("instance {instance_project}/{name}"))?;
                        continue;
                    }
                };

                if !ctx.accepts(&instance) {
                    continue;
                }

                for (device_name, device) in &instance.expanded_devices {
                    if !device.is_nic_on(&network.name) {
                        continue;
                    }

                    for family in AddressFamily::ALL {
                        for raw in device.external_routes(family) {
                            let prefix = match raw.parse::<IpPrefix>() {
                                Ok(prefix) if prefix.family() == family => prefix,
                                Ok(_) | Err(_) => {
                                    warn!(
                                        instance = %name,
                                        device = %device_name,
                                        prefix = %raw,
                                        "Skipping invalid external route"
                                    );
                                    continue;
                                }
                            };
                            let Some(nexthop) = nexthops.get(family) else {
                                warn!(
                                    instance = %name,
                                    network = %network.name,
                                    prefix = %prefix,
                                    "No tracked next-hop for external route"
                                );
                                continue;
                            };
                            out.push(RouteCandidate::new(
                                prefix,
                                nexthop,
                                CandidateSource::InstanceRoute {
                                    project: instance_project.clone(),
                                    instance: name.clone(),
                                    device: device_name.clone(),
                                },
                            ));
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

#[async_trait]
impl TraversalStrategy for ManagedStrategy {
    fn name(&self) -> &'static str {
        "managed"
    }

    async fn collect(
        &self,
        uplink: &Network,
        ctx: &CollectContext<'_>,
        out: &mut Vec<RouteCandidate>,
    ) -> Result<()> {
        for (project, names) in parse_used_by(&uplink.used_by, KIND_NETWORKS) {
            for name in names {
                let network = match ctx.platform.get_network(&project, &name).await {
                    Ok(network) => network,
                    Err(e) => {
                        skip_entity(e, &format!("network {project}/{name}"))?;
                        continue;
                    }
                };
                self.collect_network(&project, &network, ctx, out).await?;
            }
        }
        Ok(())
    }
}
