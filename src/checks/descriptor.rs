use crate::error::{RegtestError, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Archive {
    TarGz,
    TarBz2,
    Zip,
}

impl Archive {
    pub fn extension(&self) -> &'static str {
        match self {
            Archive::TarGz => "tar.gz",
            Archive::TarBz2 => "tar.bz2",
            Archive::Zip => "zip",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildSystem {
    Make,
    Autotools,
    /// Installed software, nothing to compile
    None,
}

/// Where a benchmark's sources come from and how they are unpacked and built
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkDescriptor {
    pub name: String,
    pub version: String,
    pub url: Option<String>,
    pub sha256: Option<String>,
    pub archive: Archive,
    pub build_system: BuildSystem,
    /// Directory under the first-letter bucket of the source cache
    pub cache_dir: String,
    /// Archive file name, when it is not `<name>-<version>.<ext>`
    pub file_name: Option<String>,
    /// Extract only these members, stripping this many leading components
    pub members: Vec<String>,
    pub strip_components: u32,
    /// Commands run inside the unpacked tree before building
    pub patch_cmds: Vec<String>,
}

impl BenchmarkDescriptor {
    fn new(name: &str, version: &str, archive: Archive, build_system: BuildSystem) -> Self {
        BenchmarkDescriptor {
            name: name.to_string(),
            version: version.to_string(),
            url: None,
            sha256: None,
            archive,
            build_system,
            cache_dir: name.to_string(),
            file_name: None,
            members: Vec::new(),
            strip_components: 1,
            patch_cmds: Vec::new(),
        }
    }

    fn url(mut self, url: &str) -> Self {
        self.url = Some(url.to_string());
        self
    }

    fn patch(mut self, cmd: &str) -> Self {
        self.patch_cmds.push(cmd.to_string());
        self
    }

    /// `<name>-<version>`
    pub fn source_dir(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }

    pub fn archive_name(&self) -> String {
        self.file_name
            .clone()
            .unwrap_or_else(|| format!("{}.{}", self.source_dir(), self.archive.extension()))
    }

    /// `<root>/<n>/<cache_dir>/<archive>`, `n` being the lower-cased first letter of the name
    pub fn source_path(&self, root: &Path) -> PathBuf {
        let bucket: String = self
            .name
            .chars()
            .next()
            .map(|c| c.to_lowercase().collect())
            .unwrap_or_default();
        root.join(bucket).join(&self.cache_dir).join(self.archive_name())
    }

    fn extract_cmd(&self, path: &Path) -> String {
        let dir = self.source_dir();
        let path = path.display();
        if !self.members.is_empty() {
            return format!(
                "mkdir {dir} && cd {dir} && tar -xvf {path} {} --strip-components {}",
                self.members.join(" "),
                self.strip_components
            );
        }
        match self.archive {
            Archive::Zip => format!("mkdir {dir} && unzip {path} -d {dir} && cd {dir}"),
            Archive::TarGz => format!(
                "mkdir {dir} && tar -xzvf {path} --strip-components {} -C {dir} && cd {dir}",
                self.strip_components
            ),
            Archive::TarBz2 => format!(
                "mkdir {dir} && tar -xjvf {path} --strip-components {} -C {dir} && cd {dir}",
                self.strip_components
            ),
        }
    }

    /// Shell steps before the build: download (only if absent), verify, unpack, patch
    pub fn prebuild_commands(&self, root: &Path, archive_exists: bool) -> Vec<String> {
        let path = self.source_path(root);
        let mut cmds = Vec::new();

        if !archive_exists {
            if let (Some(url), Some(parent)) = (&self.url, path.parent()) {
                cmds.push(format!(
                    "mkdir -p {} && wget {} -O {}",
                    parent.display(),
                    url,
                    path.display()
                ));
            }
        }
        if let Some(sha) = &self.sha256 {
            cmds.push(format!("sha256sum -c <(echo {} {})", sha, path.display()));
        }
        cmds.push(self.extract_cmd(&path));
        cmds.extend(self.patch_cmds.iter().cloned());
        cmds
    }

    /// Compile commands with `max_concurrency` parallel jobs
    pub fn build_commands(&self, max_concurrency: u32, options: &[String]) -> Vec<String> {
        let make = std::iter::once(format!("make -j {}", max_concurrency.max(1)))
            .chain(options.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ");
        match self.build_system {
            BuildSystem::Make => vec![make],
            BuildSystem::Autotools => vec!["./configure".to_string(), make],
            BuildSystem::None => Vec::new(),
        }
    }
}

pub const BLAS_TESTER: &str = "BLAS-Tester";
pub const C_RAY: &str = "c-ray";
pub const BENCH_MEM: &str = "benchMEM";
pub const CP2K: &str = "cp2k";
pub const IOR: &str = "IOR";
pub const OSU: &str = "osu-micro-benchmarks";

/// Every benchmark the suite knows how to fetch
pub fn benchmarks() -> Vec<BenchmarkDescriptor> {
    let blas = BenchmarkDescriptor::new(BLAS_TESTER, "20160411", Archive::TarGz, BuildSystem::Make)
        .url("https://github.com/xianyi/BLAS-Tester/archive/8e1f624.tar.gz")
        .patch("sed -i -e 's/-openmp/-qopenmp/g' Makefile.system");

    let c_ray = BenchmarkDescriptor::new(C_RAY, "1.1", Archive::TarGz, BuildSystem::Make)
        .url("https://www.phoronix.net/downloads/phoronix-test-suite/benchmark-files/c-ray-1.1.tar.gz")
        .patch("make clean");

    let mut bench_mem = BenchmarkDescriptor::new(BENCH_MEM, "20200626", Archive::Zip, BuildSystem::None)
        .url("https://www.mpibpc.mpg.de/15101317/benchMEM.zip");
    bench_mem.sha256 =
        Some("3c1c8cd4f274d532f48c4668e1490d389486850d6b3b258dfad4581aa11380a4".to_string());

    // only the benchmark input is taken from the CP2K source tarball
    let mut cp2k = BenchmarkDescriptor::new(CP2K, "6.1", Archive::TarBz2, BuildSystem::None);
    cp2k.cache_dir = CP2K.to_uppercase();
    cp2k.members = vec!["cp2k-6.1/tests/QS/benchmark/H2O-128.inp".to_string()];
    cp2k.strip_components = 4;

    let mut ior = BenchmarkDescriptor::new(IOR, "3.3.0", Archive::TarGz, BuildSystem::Autotools)
        .url("https://github.com/hpc/ior/archive/3.3.0.tar.gz")
        .patch("./bootstrap");
    ior.file_name = Some("3.3.0.tar.gz".to_string());

    let osu = BenchmarkDescriptor::new(OSU, "5.6.2", Archive::TarGz, BuildSystem::Autotools)
        .url("https://mvapich.cse.ohio-state.edu/download/mvapich/osu-micro-benchmarks-5.6.2.tar.gz");

    vec![blas, c_ray, bench_mem, cp2k, ior, osu]
}

pub fn find_benchmark(name: &str) -> Result<BenchmarkDescriptor> {
    benchmarks()
        .into_iter()
        .find(|b| b.name.eq_ignore_ascii_case(name))
        .ok_or_else(|| RegtestError::UnknownBenchmark(name.to_string()))
}
