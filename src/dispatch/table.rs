use super::TestDefinition;

const SERIAL: (&str, &str) = ("exec-policy", "serial");

/// Runnable test definitions and the systems they are valid on
pub const DEFINITIONS: &[TestDefinition] = &[
    TestDefinition {
        checkpath: "blas-tester",
        name: None,
        valid_prog_environs: Some(&["foss-2021a", "intel-2021a"]),
        valid_systems: &[
            ("hydra", &["hydra:skylake-sn", "hydra:broadwell-sn", "hydra:ivybridge-sn"]),
            ("chimera", &["chimera:broadwell-sn", "chimera:haswell-sn"]),
            ("manticore", &["manticore:skylake-sn", "manticore:ivybridge-sn"]),
            ("local", &["local:local"]),
        ],
        setvar_extra: &[
            ("num_cpus_per_task", "4"),
            ("BLASTest.exclusive_access", "false"),
        ],
        extra: &[SERIAL],
        env: &[],
    },
    TestDefinition {
        checkpath: "cp2k_tests",
        name: Some("CP2KTestSingleNode"),
        valid_prog_environs: None,
        valid_systems: &[
            ("hydra", &["hydra:skylake-sn-mpi", "hydra:broadwell-mpi", "hydra:ivybridge-mpi"]),
            ("chimera", &["chimera:broadwell-mpi", "chimera:haswell-mpi"]),
            ("manticore", &["manticore:skylake-mpi", "manticore:ivybridge-mpi"]),
            ("local", &["local:local"]),
        ],
        setvar_extra: &[
            ("modules", "CP2K/7.1-intel-2020a"),
            ("num_tasks", "4"),
            ("num_tasks_per_node", "4"),
            ("exclusive_access", "false"),
        ],
        extra: &[SERIAL],
        env: &[],
    },
    TestDefinition {
        checkpath: "cp2k_tests",
        name: Some("CP2KTestMultiNode"),
        valid_prog_environs: None,
        valid_systems: &[
            ("hydra", &["hydra:skylake-mn-mpi-ib", "hydra:ivybridge-mpi"]),
            ("chimera", &["chimera:broadwell-mpi", "chimera:haswell-mpi"]),
            ("local", &["local:local-mpi"]),
        ],
        setvar_extra: &[
            ("modules", "CP2K/7.1-intel-2020a"),
            ("num_tasks", "4"),
            ("num_tasks_per_node", "1"),
            ("exclusive_access", "false"),
        ],
        extra: &[SERIAL],
        env: &[],
    },
    TestDefinition {
        checkpath: "gromacs_bench",
        name: Some("GMXBenchMEMMultiNode"),
        valid_prog_environs: None,
        valid_systems: &[
            ("hydra", &["hydra:skylake-mn-mpi-ib", "hydra:ivybridge-mpi"]),
            ("chimera", &["chimera:broadwell-mpi", "chimera:haswell-mpi"]),
            ("local", &["local:local-mpi"]),
        ],
        setvar_extra: &[
            ("modules", "GROMACS/2021.3-foss-2021a"),
            ("num_tasks", "4"),
            ("num_tasks_per_node", "1"),
            ("exclusive_access", "false"),
        ],
        extra: &[SERIAL],
        env: &[],
    },
    TestDefinition {
        checkpath: "gromacs_bench",
        name: Some("GMXBenchMEMSingleNode"),
        valid_prog_environs: None,
        valid_systems: &[
            ("hydra", &["hydra:skylake-sn", "hydra:broadwell-sn", "hydra:ivybridge-sn"]),
            ("chimera", &["chimera:broadwell-sn", "chimera:haswell-sn"]),
            ("manticore", &["manticore:skylake-sn", "manticore:ivybridge-sn"]),
            ("local", &["local:local"]),
        ],
        setvar_extra: &[
            ("modules", "GROMACS/2021.3-foss-2021a"),
            ("num_cpus_per_task", "4"),
            ("exclusive_access", "false"),
        ],
        extra: &[SERIAL],
        env: &[],
    },
    TestDefinition {
        checkpath: "gromacs_bench",
        name: Some("GMXBenchMEMSingleNodeGPU"),
        valid_prog_environs: None,
        valid_systems: &[
            ("hydra", &["hydra:zen2-ampere-sn-gpu", "hydra:broadwell-pascal-sn-gpu"]),
            ("local", &["local:local"]),
        ],
        setvar_extra: &[
            ("modules", "GROMACS/2021.3-foss-2021a-CUDA-11.3.1"),
            ("num_cpus_per_task", "4"),
            ("num_gpus_per_node", "1"),
            ("exclusive_access", "false"),
        ],
        extra: &[SERIAL],
        env: &[],
    },
    TestDefinition {
        checkpath: "ior",
        name: None,
        valid_prog_environs: Some(&["foss-2021a"]),
        valid_systems: &[
            ("hydra", &["hydra:skylake-mn-mpi-ib", "hydra:skylake-mn-mpi-eth"]),
            ("local", &["local:local-mpi"]),
        ],
        setvar_extra: &[
            ("iorBuildTest.num_cpus_per_task", "4"),
            ("iorWriteTest.num_tasks", "4"),
            ("iorReadTest.num_tasks", "4"),
            ("iorWriteTest.exclusive_access", "false"),
            ("iorReadTest.exclusive_access", "false"),
        ],
        extra: &[SERIAL, ("job-option", "mem-per-cpu=4G")],
        env: &[],
    },
    TestDefinition {
        checkpath: "lmod",
        name: None,
        valid_prog_environs: None,
        valid_systems: &[
            ("hydra", &["hydra:skylake-sn"]),
            ("manticore", &["manticore:skylake-sn"]),
            ("chimera", &["chimera:broadwell-sn"]),
            ("local", &["local:local"]),
        ],
        setvar_extra: &[],
        extra: &[],
        env: &[],
    },
    TestDefinition {
        checkpath: "osu",
        name: None,
        valid_prog_environs: Some(&["foss-2021a", "intel-2021a"]),
        valid_systems: &[
            ("hydra", &["hydra:skylake-mn-mpi-ib", "hydra:ivybridge-mpi"]),
            ("manticore", &["manticore:skylake-mpi", "manticore:ivybridge-mpi"]),
            ("chimera", &["chimera:broadwell-mpi", "chimera:haswell-mpi"]),
            ("local", &["local:local-mpi"]),
        ],
        setvar_extra: &[
            ("OSULatencyTest.num_tasks", "2"),
            ("OSUBandwidthTest.num_tasks", "2"),
            ("OSUBuildTest.num_cpus_per_task", "4"),
            ("OSULatencyTest.exclusive_access", "false"),
            ("OSUBandwidthTest.exclusive_access", "false"),
        ],
        extra: &[SERIAL, ("tag", "prod_small")],
        env: &[],
    },
    TestDefinition {
        checkpath: "slurm",
        name: None,
        valid_prog_environs: None,
        valid_systems: &[
            ("hydra", &["hydra:skylake-sn"]),
            ("manticore", &["manticore:skylake-sn"]),
            ("chimera", &["chimera:broadwell-sn"]),
            ("local", &["local:local"]),
        ],
        setvar_extra: &[],
        extra: &[],
        // must not leak into the job environment
        env: &[("TEST_ENVAR_OUTSIDE", "defined")],
    },
    TestDefinition {
        checkpath: "slurm_gpu",
        name: None,
        valid_prog_environs: None,
        valid_systems: &[
            ("hydra", &["hydra:zen2-ampere-sn-gpu", "hydra:broadwell-pascal-sn-gpu"]),
            ("local", &["local:local"]),
        ],
        setvar_extra: &[],
        extra: &[],
        env: &[],
    },
];
