//! Client certificate material for Magnum clusters.
//!
//! Magnum signs client certificates from a CSR. The private key is generated
//! locally and never leaves the machine.

use rcgen::{CertificateParams, DistinguishedName, DnType, DnValue, KeyPair};

use crate::cluster::CredentialsBundle;
use crate::error::{BackendKind, ClusterError};

/// CA certificate file name in the bundle.
pub const CA_FILE: &str = "ca.pem";
/// Client certificate file name in the bundle.
pub const CERT_FILE: &str = "cert.pem";
/// Client private key file name in the bundle.
pub const KEY_FILE: &str = "key.pem";
/// Docker environment script file name in the bundle.
pub const DOCKER_ENV_FILE: &str = "docker.env";

/// Freshly generated private key and the CSR to send for signing.
#[derive(Clone, Debug)]
pub(crate) struct ClientCertRequest {
    pub(crate) key_pem: String,
    pub(crate) csr_pem: String,
}

impl ClientCertRequest {
    /// Generates a key pair and a CSR whose common name is `common_name`.
    pub(crate) fn generate(common_name: &str) -> Result<Self, ClusterError> {
        let operation = "generate a client certificate request";
        let key_pair = KeyPair::generate()
            .map_err(|err| ClusterError::transport(BackendKind::Magnum, operation, err))?;

        let mut params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(
            DnType::CommonName,
            DnValue::Utf8String(common_name.to_owned()),
        );
        params.distinguished_name = dn;

        let csr_pem = params
            .serialize_request(&key_pair)
            .and_then(|csr| csr.pem())
            .map_err(|err| ClusterError::transport(BackendKind::Magnum, operation, err))?;

        Ok(Self {
            key_pem: key_pair.serialize_pem(),
            csr_pem,
        })
    }
}

/// Shell snippet pointing the Docker client at the cluster.
pub(crate) fn docker_env(api_address: Option<&str>) -> String {
    let mut script = String::new();
    if let Some(address) = api_address {
        script.push_str(&format!("export DOCKER_HOST={address}\n"));
    }
    script.push_str("export DOCKER_TLS_VERIFY=1\n");
    script.push_str("export DOCKER_CERT_PATH=$(cd \"$(dirname \"${BASH_SOURCE[0]}\")\" && pwd)\n");
    script
}

/// Assembles the bundle from the signed material.
pub(crate) fn bundle(
    ca_pem: String,
    cert_pem: String,
    request: ClientCertRequest,
    api_address: Option<&str>,
) -> CredentialsBundle {
    let mut bundle = CredentialsBundle::default();
    bundle.insert(CA_FILE, ca_pem);
    bundle.insert(CERT_FILE, cert_pem);
    bundle.insert(KEY_FILE, request.key_pem);
    bundle.insert(DOCKER_ENV_FILE, docker_env(api_address));
    bundle
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_produces_pem_key_and_csr() {
        let request = ClientCertRequest::generate("bob")
            .unwrap_or_else(|err| panic!("csr generation: {err}"));
        assert!(request.key_pem.contains("PRIVATE KEY"));
        assert!(request.csr_pem.contains("CERTIFICATE REQUEST"));
    }

    #[test]
    fn docker_env_exports_host_when_known() {
        let script = docker_env(Some("tcp://172.24.4.5:2376"));
        assert!(script.contains("export DOCKER_HOST=tcp://172.24.4.5:2376"));
        assert!(script.contains("DOCKER_TLS_VERIFY=1"));
        assert!(!docker_env(None).contains("DOCKER_HOST"));
    }

    #[test]
    fn bundle_contains_every_file() {
        let request = ClientCertRequest {
            key_pem: String::from("key"),
            csr_pem: String::from("csr"),
        };
        let files = bundle(String::from("ca"), String::from("cert"), request, None);
        assert_eq!(files.get(CA_FILE), Some(b"ca".as_slice()));
        assert_eq!(files.get(CERT_FILE), Some(b"cert".as_slice()));
        assert_eq!(files.get(KEY_FILE), Some(b"key".as_slice()));
        assert!(files.get(DOCKER_ENV_FILE).is_some());
    }
}
