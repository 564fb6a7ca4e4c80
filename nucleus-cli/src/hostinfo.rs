//! The `hostinfo` subcommand: show the seeded host identity record

use anyhow::Context;

use nucleus_ns::HostIdentity;

use crate::cli::HostinfoArgs;

pub fn execute(args: &HostinfoArgs) -> anyhow::Result<()> {
    let identity = HostIdentity::from_system().context("reading the host identity")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&identity)?);
    } else {
        println!("Host identity:");
        println!("  sysname:    {}", identity.sysname);
        println!("  nodename:   {}", identity.nodename);
        println!("  release:    {}", identity.release);
        println!("  version:    {}", identity.version);
        println!("  machine:    {}", identity.machine);
        println!("  domainname: {}", identity.domainname);
    }

    Ok(())
}
