//! Black-box coverage of `server::build` against small configuration
//! documents: listener enumeration, virtual pools getting their own
//! listener, and startup-time resolution failures surfacing as the
//! right `ServerError` variant.

use config::Config;

fn config_from(yaml: &str) -> Config {
    Config::from_yaml_str(yaml).expect("valid configuration")
}

#[test]
fn builds_one_listener_per_pool() {
    let config = config_from(
        "cache:\n  \
         listen: 127.0.0.1:0\n  \
         dist_type: ketama\n  \
         servers:\n    \
         - 127.0.0.1:0:1\n",
    );
    let topology = server::build(&config).expect("build succeeds");
    assert_eq!(topology.listeners.len(), 1);
    assert_eq!(topology.listeners[0].0, "cache");
}

#[test]
fn virtual_pool_gets_its_own_listener() {
    let config = config_from(
        "concrete:\n  \
         listen: 127.0.0.1:0\n  \
         dist_type: modula\n  \
         namespace: ns1\n  \
         servers:\n    \
         - 127.0.0.1:0:1\n\
         front:\n  \
         listen: 127.0.0.1:0\n  \
         dist_type: ketama\n  \
         virtual_pool: true\n  \
         downstreams:\n    \
         - name: concrete\n      ns: ns1\n",
    );
    let topology = server::build(&config).expect("build succeeds");
    let names: Vec<&str> = topology.listeners.iter().map(|(name, _, _)| name.as_str()).collect();
    assert!(names.contains(&"concrete"));
    assert!(names.contains(&"front"));
    assert_eq!(topology.runtimes.len(), 2);
    assert!(topology.runtimes["front"].is_virtual);
    assert!(!topology.runtimes["concrete"].is_virtual);
}

#[test]
fn unresolvable_server_host_fails_build() {
    let config = config_from(
        "cache:\n  \
         listen: 127.0.0.1:0\n  \
         dist_type: modula\n  \
         servers:\n    \
         - this-host-does-not-resolve.invalid:11211:1\n",
    );
    let error = server::build(&config).unwrap_err();
    assert!(matches!(error, server::ServerError::Resolve { .. }));
}

#[test]
fn timeout_ms_is_converted_to_microseconds_for_the_engine() {
    let config = config_from(
        "cache:\n  \
         listen: 127.0.0.1:0\n  \
         dist_type: modula\n  \
         timeout_ms: 250\n  \
         servers:\n    \
         - 127.0.0.1:0:1\n",
    );
    let topology = server::build(&config).expect("build succeeds");
    assert_eq!(topology.runtimes["cache"].timeout_ms, 250_000);
}
