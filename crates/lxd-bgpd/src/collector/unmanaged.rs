//! Traversal of unmanaged uplinks by full enumeration

use super::{skip_entity, CandidateSource, CollectContext, RouteCandidate, TraversalStrategy};
use crate::error::Result;
use crate::topology::{split_list, Network, DEFAULT_ROUTE_ANNOTATION_KEY};
use async_trait::async_trait;
use lxd_bgp_types::{IpAddress, IpPrefix};
use tracing::{debug, warn};

/// Derives routes from `prefix_nexthop` annotations on instance devices.
///
/// The platform does not track what hangs off an unmanaged network, so every
/// instance in every project is inspected.
#[derive(Debug, Clone)]
pub struct UnmanagedStrategy {
    annotation_key: String,
}

impl Default for UnmanagedStrategy {
    fn default() -> Self {
        Self::new(DEFAULT_ROUTE_ANNOTATION_KEY)
    }
}

impl UnmanagedStrategy {
    pub fn new(annotation_key: impl Into<String>) -> Self {
        Self {
            annotation_key: annotation_key.into(),
        }
    }

    pub fn annotation_key(&self) -> &str {
        &self.annotation_key
    }
}

/// Parses one `prefix_nexthop` token.
///
/// Returns `None` when the token does not have exactly two parts or either
/// part does not parse. Address families are not cross-checked.
pub fn parse_annotation_token(token: &str) -> Option<(IpPrefix, IpAddress)> {
    let parts: Vec<&str> = token.split('_').collect();
    let [prefix, nexthop] = parts.as_slice() else {
        return None;
    };
    Some((prefix.parse().ok()?, nexthop.parse().ok()?))
}

#[async_trait]
impl TraversalStrategy for UnmanagedStrategy {
    fn name(&self) -> &'static str {
        "unmanaged"
    }

    async fn collect(
        &self,
        _uplink: &Network,
        ctx: &CollectContext<'_>,
        out: &mut Vec<RouteCandidate>,
    ) -> Result<()> {
        // No project list means no view of the topology at all.
        let projects = ctx.platform.list_projects().await?;

        for project in projects {
            let instances = match ctx.platform.list_instances(&project).await {
                Ok(instances) => instances,
                Err(e) => {
                    skip_entity(e, &format!("instances of project {project}"))?;
                    continue;
                }
            };

            for instance in instances.iter().filter(|i| ctx.accepts(i)) {
                for (device_name, device) in &instance.expanded_devices {
                    let Some(annotation) = device.get(&self.annotation_key) else {
                        continue;
                    };

                    for token in split_list(annotation) {
                        let Some((prefix, nexthop)) = parse_annotation_token(token) else {
                            warn!(
                                instance = %instance.name,
                                device = %device_name,
                                token = %token,
                                "Skipping malformed route annotation"
                            );
                            continue;
                        };
                        let candidate = RouteCandidate::new(
                            prefix,
                            nexthop,
                            CandidateSource::Annotation {
                                project: project.clone(),
                                instance: instance.name.clone(),
                                device: device_name.clone(),
                            },
                        );
                        if !candidate.key().is_single_family() {
                            debug!(
                                instance = %instance.name,
                                route = %candidate.key(),
                                "Route annotation mixes address families"
                            );
                        }
                        out.push(candidate);
                    }
                }
            }
        }

        Ok(())
    }
}
