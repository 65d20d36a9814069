//! Prints the `EgressIPAM` CustomResourceDefinition as YAML.

use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&crds::EgressIPAM::crd())?);
    Ok(())
}
