//! Prints the Message CustomResourceDefinition as YAML.
//!
//! Usage: `cargo run -p crds --bin crdgen > message-crd.yaml`

use crds::Message;
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    let yaml = serde_yaml::to_string(&Message::crd())?;
    print!("{yaml}");
    Ok(())
}
