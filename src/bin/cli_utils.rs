use ipmeta::mmdb::IpVersion;
use std::net::IpAddr;

/// The address a search tree actually walks
///
/// IPv4 trees answer IPv4-mapped IPv6 input as plain IPv4, so the prefix
/// length they report counts IPv4 bits.
pub fn searched_address(ip: IpAddr, tree: IpVersion) -> IpAddr {
    match (ip, tree) {
        (IpAddr::V6(v6), IpVersion::V4) => v6.to_ipv4_mapped().map_or(ip, IpAddr::V4),
        _ => ip,
    }
}

/// Network containing `ip` with the given prefix, e.g. "81.2.69.0/24"
pub fn format_network(ip: IpAddr, prefix_len: u8) -> String {
    match ip {
        IpAddr::V4(v4) => {
            let bits = u32::from(v4);
            let mask = u32::MAX
                .checked_shl(32 - u32::from(prefix_len.min(32)))
                .unwrap_or(0);
            format!("{}/{}", std::net::Ipv4Addr::from(bits & mask), prefix_len)
        }
        IpAddr::V6(v6) => {
            let bits = u128::from(v6);
            let mask = u128::MAX
                .checked_shl(128 - u32::from(prefix_len.min(128)))
                .unwrap_or(0);
            format!("{}/{}", std::net::Ipv6Addr::from(bits & mask), prefix_len)
        }
    }
}
