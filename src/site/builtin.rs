use super::types::*;
use std::collections::BTreeMap;

pub const ENVIRONS_CPU: &[&str] = &[
    "builtin",
    "foss-2019b",
    "intel-2019b",
    "foss-2020a",
    "intel-2020a",
    "foss-2020b",
    "intel-2020b",
    "foss-2021a",
    "intel-2021a",
];

pub const ENVIRONS_GPU: &[&str] = &["fosscuda-2019b", "fosscuda-2020a"];

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn cpu_and_gpu() -> Vec<String> {
    ENVIRONS_CPU.iter().chain(ENVIRONS_GPU).map(|s| s.to_string()).collect()
}

fn partition(
    name: &str,
    scheduler: Scheduler,
    access: &[&str],
    descr: &str,
    max_jobs: u32,
    launcher: Launcher,
) -> Partition {
    Partition {
        name: name.to_string(),
        scheduler,
        modules: Vec::new(),
        access: names(access),
        environs: names(ENVIRONS_CPU),
        descr: descr.to_string(),
        max_jobs,
        launcher,
        resources: Vec::new(),
    }
}

fn gpu_partition(name: &str, access: &str, descr: &str) -> Partition {
    Partition {
        environs: cpu_and_gpu(),
        resources: vec![Resource {
            name: "gpu".to_string(),
            options: vec!["--gres=gpu:{num_gpus_per_node}".to_string()],
        }],
        ..partition(name, Scheduler::Slurm, &[access], descr, 1, Launcher::Local)
    }
}

fn with_modules(mut partition: Partition, modules: &[&str]) -> Partition {
    partition.modules = names(modules);
    partition
}

fn hydra() -> System {
    use Launcher::{Local, Srun};
    use Scheduler::Slurm;

    System {
        name: "hydra".to_string(),
        descr: "Hydra".to_string(),
        hostnames: names(&["login1.cerberus.os", "login2.cerberus.os", ".*hydra.*"]),
        modules_system: "lmod".to_string(),
        partitions: vec![
            partition("local", Scheduler::Local, &[], "tests in the local node (no job)", 1, Local),
            partition("skylake-sn", Slurm, &["--partition=skylake,skylake_mpi"], "single-node jobs in Skylake nodes", 10, Local),
            partition("skylake-sn-mpi", Slurm, &["--partition=skylake,skylake_mpi"], "single-node MPI jobs in Skylake nodes", 10, Srun),
            partition("skylake-mn-mpi-ib", Slurm, &["--partition=skylake_mpi"], "multi-node MPI jobs in Skylake nodes with infiniband", 1, Srun),
            partition("skylake-mn-mpi-eth", Slurm, &["--partition=skylake"], "multi-node MPI jobs in Skylake nodes without infiniband", 1, Srun),
            partition("broadwell-sn", Slurm, &["--partition=broadwell"], "single-node jobs in Broadwell nodes", 10, Local),
            partition("broadwell-mpi", Slurm, &["--partition=broadwell"], "MPI jobs in Broadwell nodes", 10, Srun),
            partition("ivybridge-sn", Slurm, &["--partition=ivybridge_mpi"], "single-node jobs in Ivybridge nodes", 10, Local),
            partition("ivybridge-mpi", Slurm, &["--partition=ivybridge_mpi"], "MPI jobs in Ivybridge nodes", 1, Srun),
            gpu_partition("broadwell-pascal-sn-gpu", "--partition=pascal_gpu", "single-node jobs in Broadwell nodes with Pascal P100 GPUs"),
            gpu_partition("zen2-ampere-sn-gpu", "--partition=ampere_gpu", "single-node jobs in Zen2 nodes with Ampere A100 GPUs"),
            gpu_partition("ivybridge-kepler", "--partition=kepler_gpu", "single-node jobs in Ivybridge nodes with Kepler K20 GPUs"),
        ],
    }
}

fn chimera() -> System {
    use Launcher::{Local, Srun};
    use Scheduler::Slurm;
    let cluster = ["cluster/chimera"];

    System {
        name: "chimera".to_string(),
        descr: "Chimera".to_string(),
        hostnames: names(&["login1.cerberus.os", "login2.cerberus.os", ".*chimera.*"]),
        modules_system: "lmod".to_string(),
        partitions: vec![
            with_modules(partition("haswell-sn", Slurm, &[], "single-node jobs in Haswell nodes", 1, Local), &cluster),
            with_modules(partition("broadwell-sn", Slurm, &[], "single-node jobs in Broadwell nodes", 1, Local), &cluster),
            with_modules(partition("haswell-mpi", Slurm, &[], "MPI jobs in Haswell nodes", 1, Srun), &cluster),
            with_modules(partition("broadwell-mpi", Slurm, &[], "MPI jobs in Broadwell nodes", 1, Srun), &cluster),
        ],
    }
}

fn manticore() -> System {
    use Launcher::{Local, Srun};
    use Scheduler::Slurm;

    System {
        name: "manticore".to_string(),
        descr: "Manticore".to_string(),
        hostnames: names(&[".*manticore.*"]),
        modules_system: "lmod".to_string(),
        partitions: vec![
            partition("skylake-sn", Slurm, &["--partition=zen3"], "single-node jobs", 10, Local),
            partition("skylake-mpi", Slurm, &["--partition=zen3_mpi"], "MPI jobs", 1, Srun),
            partition("ivybridge-sn", Slurm, &["--partition=zen3"], "single-node jobs", 10, Local),
            partition("ivybridge-mpi", Slurm, &["--partition=zen3_mpi"], "MPI jobs", 1, Srun),
        ],
    }
}

fn local() -> System {
    System {
        name: "local".to_string(),
        descr: "local workstation".to_string(),
        hostnames: names(&["localhost"]),
        modules_system: "lmod".to_string(),
        partitions: vec![
            partition("local", Scheduler::Local, &[], "tests in the local node (no job)", 1, Launcher::Local),
            partition("local-mpi", Scheduler::Local, &[], "MPI tests in the local node", 1, Launcher::Local),
        ],
    }
}

fn environment(name: &str, modules: &[&str], mpi: bool, intel: bool) -> Environment {
    let (cc, cxx, ftn) = match (mpi, intel) {
        (false, _) => ("gcc", "g++", "gfortran"),
        (true, false) => ("mpicc", "mpicxx", "mpif90"),
        (true, true) => ("mpiicc", "mpiicpc", "mpiifort"),
    };
    Environment {
        name: name.to_string(),
        modules: names(modules),
        cc: cc.to_string(),
        cxx: cxx.to_string(),
        ftn: ftn.to_string(),
    }
}

fn environments() -> Vec<Environment> {
    vec![
        environment("builtin", &[], false, false),
        environment("foss-2019b", &["foss/2019b", "Autotools/20180311-GCCcore-8.3.0"], true, false),
        environment("intel-2019b", &["intel/2019b", "Autotools/20180311-GCCcore-8.3.0"], true, true),
        environment("foss-2020a", &["foss/2020a", "Autotools/20180311-GCCcore-9.3.0"], true, false),
        environment("intel-2020a", &["intel/2020a", "Autotools/20180311-GCCcore-9.3.0"], true, true),
        environment("foss-2020b", &["foss/2020b", "Autotools/20200321-GCCcore-10.2.0"], true, false),
        environment("intel-2020b", &["intel/2020b", "Autotools/20200321-GCCcore-10.2.0"], true, true),
        environment("foss-2021a", &["foss/2021a", "Autotools/20210128-GCCcore-10.3.0"], true, false),
        environment("intel-2021a", &["intel/2021a", "Autotools/20210128-GCCcore-10.3.0"], true, true),
        environment("fosscuda-2019b", &["fosscuda/2019b", "Autotools/20180311-GCCcore-8.3.0"], true, false),
        environment("fosscuda-2020a", &["fosscuda/2020a", "Autotools/20180311-GCCcore-9.3.0"], true, false),
    ]
}

fn policy(gpu: &[(&str, u32)], smp: &[&str], mpi: &[&str]) -> PartitionPolicy {
    PartitionPolicy {
        gpu: gpu.iter().map(|(p, c)| (p.to_string(), *c)).collect(),
        smp: names(smp),
        mpi: names(mpi),
    }
}

fn policies() -> BTreeMap<String, PartitionPolicy> {
    let mut map = BTreeMap::new();
    map.insert(
        "hydra".to_string(),
        policy(&[("ampere_gpu", 16), ("pascal_gpu", 12)], &["skylake", "zen4"], &["skylake_mpi"]),
    );
    map.insert(
        "chimera".to_string(),
        policy(&[], &["broadwell_mpi", "haswell_mpi"], &["broadwell_mpi", "haswell_mpi"]),
    );
    map.insert(
        "manticore".to_string(),
        policy(&[("ampere_gpu", 2)], &["zen3"], &["zen3_mpi"]),
    );
    map.insert(
        "anansi".to_string(),
        policy(&[("pascal_gpu", 16)], &["pascal_gpu"], &["pascal_gpu"]),
    );
    map
}

/// The site tables shipped with the suite
pub fn builtin_site() -> SiteConfig {
    SiteConfig {
        systems: vec![hydra(), chimera(), manticore(), local()],
        environments: environments(),
        policies: policies(),
        general: General::default(),
    }
}
