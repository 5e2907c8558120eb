//! Capability catalog for resource kinds.
//!
//! Maps every [`ResourceKind`] to its required attributes, the attributes
//! that cannot change in place on the provider side, and the output names
//! the resource exports after a successful apply. This table replaces a
//! per-kind type hierarchy: validation, diffing, and resolution all consult
//! the same static entry.

use super::spec::ResourceKind;

/// Capability description for a single resource kind.
#[derive(Debug, Clone, Copy)]
pub struct KindCapabilities {
    /// Attributes that must be present in every spec of this kind.
    pub required: &'static [&'static str],
    /// Attributes whose change forces a new physical identity.
    pub immutable: &'static [&'static str],
    /// Output names exported after a successful apply.
    pub outputs: &'static [&'static str],
}

const HOSTED_ZONE: KindCapabilities = KindCapabilities {
    required: &["domain_name"],
    immutable: &["domain_name"],
    outputs: &["zone_id", "name_servers"],
};

const CERTIFICATE: KindCapabilities = KindCapabilities {
    required: &["domain_name"],
    immutable: &["domain_name"],
    outputs: &["certificate_arn"],
};

const BUCKET: KindCapabilities = KindCapabilities {
    required: &["bucket_name"],
    immutable: &["bucket_name"],
    outputs: &["bucket_arn", "bucket_domain"],
};

const DISTRIBUTION: KindCapabilities = KindCapabilities {
    required: &["origin_domain"],
    immutable: &[],
    outputs: &["distribution_id", "domain_name"],
};

const DNS_RECORD: KindCapabilities = KindCapabilities {
    required: &["zone_id", "record_name", "target"],
    immutable: &["record_name"],
    outputs: &["fqdn"],
};

const REST_API: KindCapabilities = KindCapabilities {
    required: &["api_name", "endpoint_type"],
    immutable: &["endpoint_type"],
    outputs: &["api_id", "invoke_url"],
};

const FUNCTION: KindCapabilities = KindCapabilities {
    required: &["function_name", "runtime", "handler"],
    immutable: &["function_name"],
    outputs: &["function_arn"],
};

const VPC: KindCapabilities = KindCapabilities {
    required: &["cidr_block"],
    immutable: &["cidr_block"],
    outputs: &["vpc_id", "private_subnet_ids"],
};

const VPC_ENDPOINT: KindCapabilities = KindCapabilities {
    required: &["vpc_id", "service"],
    immutable: &["vpc_id", "service"],
    outputs: &["endpoint_id"],
};

const DOMAIN_MAPPING: KindCapabilities = KindCapabilities {
    required: &["domain_name", "api_id"],
    immutable: &["domain_name"],
    outputs: &["target_domain"],
};

/// Returns the capability entry for a resource kind.
#[must_use]
pub const fn capabilities(kind: ResourceKind) -> &'static KindCapabilities {
    match kind {
        ResourceKind::HostedZone => &HOSTED_ZONE,
        ResourceKind::Certificate => &CERTIFICATE,
        ResourceKind::Bucket => &BUCKET,
        ResourceKind::Distribution => &DISTRIBUTION,
        ResourceKind::DnsRecord => &DNS_RECORD,
        ResourceKind::RestApi => &REST_API,
        ResourceKind::Function => &FUNCTION,
        ResourceKind::Vpc => &VPC,
        ResourceKind::VpcEndpoint => &VPC_ENDPOINT,
        ResourceKind::DomainMapping => &DOMAIN_MAPPING,
    }
}

/// Returns true if the named attribute is immutable for the kind.
#[must_use]
pub fn is_immutable(kind: ResourceKind, attribute: &str) -> bool {
    capabilities(kind)
        .immutable
        .iter()
        .any(|candidate| *candidate == attribute)
}

/// Returns true if the kind exports the named output.
#[must_use]
pub fn exports_output(kind: ResourceKind, output: &str) -> bool {
    capabilities(kind)
        .outputs
        .iter()
        .any(|candidate| *candidate == output)
}
