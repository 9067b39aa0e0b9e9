use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};

use chrono::{TimeDelta, Utc};
use proptest::prelude::*;

use leasedir::{ConflictField, Error, HardwareAddr, Lease, LeaseDirectory};

const HOSTNAMES: [&str; 6] = ["printer", "Printer", "laptop", "LAPTOP", "phone", "tv"];

#[derive(Debug, Clone)]
enum Operation {
    Add {
        ip: u8,
        hw: u8,
        host: usize,
        is_static: bool,
    },
    Remove {
        ip: u8,
        hw: u8,
    },
    UpdateStatic {
        ip: u8,
        hw: u8,
        host: usize,
    },
    Reset,
}

fn operation() -> impl Strategy<Value = Operation> {
    prop_oneof![
        6 => (0u8..8, 0u8..8, 0usize..HOSTNAMES.len(), any::<bool>())
            .prop_map(|(ip, hw, host, is_static)| Operation::Add { ip, hw, host, is_static }),
        2 => (0u8..8, 0u8..8).prop_map(|(ip, hw)| Operation::Remove { ip, hw }),
        2 => (0u8..8, 0u8..8, 0usize..HOSTNAMES.len())
            .prop_map(|(ip, hw, host)| Operation::UpdateStatic { ip, hw, host }),
        1 => Just(Operation::Reset),
    ]
}

fn lease(ip: u8, hw: u8, host: usize, is_static: bool) -> Lease {
    let ip = IpAddr::V4(Ipv4Addr::new(10, 0, 0, ip + 1));
    let hw = HardwareAddr::from([0x02, 0, 0, 0, 0, hw]);
    if is_static {
        Lease::new_static(ip, hw, HOSTNAMES[host])
    } else {
        Lease::new_dynamic(ip, hw, HOSTNAMES[host], Utc::now() + TimeDelta::hours(1))
    }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn live_leases_stay_unique(operations in prop::collection::vec(operation(), 1..64)) {
        let directory = LeaseDirectory::new(None);
        let leases = runtime().block_on(async {
            for operation in operations {
                let result = match operation {
                    Operation::Add { ip, hw, host, is_static } => {
                        directory.add_lease(lease(ip, hw, host, is_static)).await
                    }
                    Operation::Remove { ip, hw } => {
                        directory.remove_lease(&lease(ip, hw, 0, true)).await
                    }
                    Operation::UpdateStatic { ip, hw, host } => {
                        directory.update_static_lease(lease(ip, hw, host, true)).await
                    }
                    Operation::Reset => directory.reset().await,
                };
                assert!(matches!(
                    result,
                    Ok(()) | Err(Error::Conflict { .. }) | Err(Error::NotFound(_))
                ));
            }
            directory.leases().await
        });

        let mut ips = HashSet::new();
        let mut hws = HashSet::new();
        let mut hosts = HashSet::new();
        for lease in &leases {
            prop_assert!(ips.insert(lease.ip));
            prop_assert!(hws.insert(lease.hw_addr.clone()));
            prop_assert!(hosts.insert(lease.hostname.to_lowercase()));
        }

        runtime().block_on(async {
            for lease in &leases {
                assert_eq!(directory.host_by_ip(lease.ip).await.as_ref(), Some(&lease.hostname));
                assert_eq!(directory.hw_by_ip(lease.ip).await.as_ref(), Some(&lease.hw_addr));
                assert_eq!(directory.ip_by_host(&lease.hostname).await, Some(lease.ip));
            }
        });
    }

    #[test]
    fn adds_round_trip(count in 1usize..32) {
        let directory = LeaseDirectory::new(None);
        let added: Vec<Lease> = (0..count)
            .map(|index| {
                let ip = IpAddr::V4(Ipv4Addr::new(10, 1, (index / 256) as u8, (index % 256) as u8 + 1));
                let hw = HardwareAddr::from([0x02, 0, 0, 0, 1, index as u8]);
                Lease::new_static(ip, hw, format!("host-{}", index))
            })
            .collect();

        let listed = runtime().block_on(async {
            for lease in added.iter().rev() {
                directory.add_lease(lease.clone()).await.unwrap();
            }
            directory.leases().await
        });

        prop_assert_eq!(listed, added);
    }

    #[test]
    fn address_conflict_leaves_existing(hw_a in 0u8..=255, hw_b in 0u8..=255) {
        prop_assume!(hw_a != hw_b);
        let directory = LeaseDirectory::new(None);
        let original = lease(4, hw_a, 0, true);

        let (result, leases) = runtime().block_on(async {
            directory.add_lease(original.clone()).await.unwrap();
            let result = directory.add_lease(lease(4, hw_b, 2, false)).await;
            (result, directory.leases().await)
        });

        let is_address_conflict = matches!(
            result,
            Err(Error::Conflict { field: ConflictField::Address, .. })
        );
        prop_assert!(is_address_conflict);
        prop_assert_eq!(leases, vec![original]);
    }

    #[test]
    fn hardware_addr_parse_never_panics(text in ".{0,64}") {
        let _ = text.parse::<HardwareAddr>();
    }
}
