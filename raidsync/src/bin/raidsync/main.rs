// vim: tw=80
use std::path::PathBuf;

use clap::{crate_version, Parser};
use raidsync_core::{
    fake::{Inventory, SimController},
    ArrayDeclaration,
    ArrayId,
    ApplyPlan,
    Error,
    Reconciler,
    Result,
    Topology,
    diff,
    plan,
};
use tracing_subscriber::EnvFilter;

/// Print an array's membership as a table
fn print_members(t: &Topology) {
    let mut table = tabular::Table::new("{:<}  {:<}  {:<}");
    table.add_row(tabular::Row::new()
        .with_cell("ROLE")
        .with_cell("KIND")
        .with_cell("ID"));
    for role in raidsync_core::Role::ALL {
        for dref in t.members(role).iter() {
            table.add_row(tabular::Row::new()
                .with_cell(role)
                .with_cell(dref.kind)
                .with_cell(dref.id));
        }
    }
    print!("{table}");
}

/// Print a plan as a table, one row per operation
fn print_plan(p: &ApplyPlan) {
    if p.is_empty() {
        println!("No changes");
        return;
    }
    let mut table = tabular::Table::new("{:>}  {:<}  {:<}  {:<}");
    table.add_row(tabular::Row::new()
        .with_cell("STEP")
        .with_cell("PHASE")
        .with_cell("OPERATION")
        .with_cell("MEMBERS"));
    for (i, batch) in p.iter().enumerate() {
        let ops = [
            ("add active", &batch.add_active),
            ("add spare", &batch.add_spare),
            ("remove active", &batch.remove_active),
            ("remove spare", &batch.remove_spare),
        ];
        for (op, members) in ops.into_iter().filter(|(_, m)| !m.is_empty()) {
            let list = members.iter()
                .map(|dref| dref.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            table.add_row(tabular::Row::new()
                .with_cell(i + 1)
                .with_cell(batch.phase)
                .with_cell(op)
                .with_cell(list));
        }
    }
    print!("{table}");
}

#[derive(Parser, Clone, Debug)]
/// Check a declaration against a machine, without changing anything
struct Validate {
    /// Inventory file describing the machines
    #[clap(short, long, required(true))]
    inventory:   PathBuf,
    /// Array declaration file
    #[clap(required(true))]
    declaration: PathBuf,
}

impl Validate {
    async fn main(self) -> Result<()> {
        let inventory = Inventory::open(&self.inventory)?;
        let decl = ArrayDeclaration::open(&self.declaration)?;
        let reconciler = Reconciler::new(SimController::new(inventory)?);
        let advisories = reconciler.validate(&decl).await?;
        for advisory in advisories.iter() {
            println!("Warning: {advisory}");
        }
        println!("{}: OK", decl.name);
        Ok(())
    }
}

#[derive(Parser, Clone, Debug)]
/// Show the steps needed to reshape an array from one declaration to another
struct Plan {
    /// Declaration of the array's current state
    #[clap(required(true))]
    current: PathBuf,
    /// Declaration of the array's desired state
    #[clap(required(true))]
    desired: PathBuf,
}

impl Plan {
    async fn main(self) -> Result<()> {
        let current = ArrayDeclaration::open(&self.current)?.topology();
        let desired = ArrayDeclaration::open(&self.desired)?.topology();
        if current.level() != desired.level() {
            return Err(Error::ImmutableField("level"));
        }
        let facts = Default::default();
        raidsync_core::validate(&desired, &facts)?;
        print_plan(&plan(&diff(&current, &desired)));
        Ok(())
    }
}

#[derive(Parser, Clone, Debug)]
/// Reconcile an existing array with its declaration, on a simulated controller
struct Apply {
    /// Inventory file describing the machines and their existing arrays
    #[clap(short, long, required(true))]
    inventory:   PathBuf,
    /// Id of the array to update
    #[clap(short, long, required(true))]
    array:       ArrayId,
    /// Array declaration file
    #[clap(required(true))]
    declaration: PathBuf,
}

impl Apply {
    async fn main(self) -> Result<()> {
        let inventory = Inventory::open(&self.inventory)?;
        let decl = ArrayDeclaration::open(&self.declaration)?;
        let reconciler = Reconciler::new(SimController::new(inventory)?);
        let r = reconciler.update(self.array, &decl).await;
        for call in reconciler.controller().mutations() {
            println!("{call}");
        }
        let state = r?;
        println!();
        print_members(&state.topology);
        Ok(())
    }
}

#[derive(Parser, Clone, Debug)]
enum SubCommand {
    Apply(Apply),
    Plan(Plan),
    Validate(Validate),
}

#[derive(Parser, Clone, Debug)]
#[clap(version = crate_version!())]
/// Reconcile RAID array membership with a declared topology
struct Cli {
    #[clap(subcommand)]
    cmd: SubCommand,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .pretty()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let cli: Cli = Cli::parse();
    match cli.cmd {
        SubCommand::Apply(apply) => apply.main().await,
        SubCommand::Plan(plan) => plan.main().await,
        SubCommand::Validate(validate) => validate.main().await,
    }
}
