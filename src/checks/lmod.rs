use super::config::{CheckConfig, CheckKind, Override};
use super::{CheckContext, RegressionCheck};
use crate::error::Result;
use crate::sanity::{Extraction, SanityCheck, Source};
use chrono::{DateTime, Datelike, Duration, Local};

pub const CHECKPATH: &str = "lmod";

/// One month in seconds, as the site's Lmod package defines it
const MONTH_SECS: i64 = 2629743;

const HELPDESK: &str = "If you don't understand the warning or error, contact the helpdesk at\nhpc@vub.be";
const CONFIG_JSON: &str = "config.json";

/// Toolchain generation in effect `months` from `now`: `2023a` for January
/// to June, `2023b` for July to December
pub fn toolchain_generation(now: DateTime<Local>, months: i64) -> String {
    let shifted = now + Duration::seconds(months * MONTH_SECS);
    let half = if shifted.month() < 7 { 'a' } else { 'b' };
    format!("{}{}", shifted.year(), half)
}

/// Expected Lmod settings from `module --config-json`, with their labels
const CONFIG_VALUES: &[(&str, &str, &str)] = &[
    ("siteName", "VUB_HPC", "Site name"),
    ("spdr_ignore", "no", "Ignore Cache"),
    ("disp_av_ext", "yes", "Display Extension w/ avail"),
    ("autoSwap", "no", "Auto swapping"),
    ("colorize", "yes", "Colorize Lmod"),
    ("disable1N", "yes", "Disable Same Name AutoSwap"),
    ("dupPaths", "no", "Allow duplicate paths"),
    ("exactMatch", "no", "Require Exact Match/no defaults"),
    ("expMCmd", "yes", "Export the module command"),
    ("extendDflt", "no", "Allow extended default"),
    ("lang", "en", "Language used for err/msg/warn"),
    ("lang_site", "/usr/share/lmod/etc/lang.lua", "Site message file"),
    ("ld_lib_path", "<empty>", "LD_LIBRARY_PATH at config time"),
    ("ld_preload", "<empty>", "LD_PRELOAD at config time"),
    ("pin_v", "yes", "Pin Versions in restore"),
    ("redirect", "yes", "Redirect to stdout"),
    ("sitePkg", "/usr/share/lmod/lmod/libexec/SitePackage.lua", "Site Pkg location"),
    ("z01_admin", "/usr/share/lmod/etc/admin.list", "Admin file"),
    ("spdr_loads", "no", "Cached loads"),
];

const CACHE_TIMES: &[(&str, u64, &str)] = &[
    ("tm_ancient", 86400, "User cache valid time(sec)"),
    ("tm_short", 86400, "Write cache after (sec)"),
];

fn found(pattern: &str, source: Source, label: &str) -> Result<SanityCheck> {
    Ok(SanityCheck::found(pattern, source)?.msg(label))
}

fn not_found(pattern: &str, source: Source, label: &str) -> Result<SanityCheck> {
    Ok(SanityCheck::not_found(pattern, source)?.msg(label))
}

/// A multi-line message printed verbatim
fn message(text: &str, source: Source) -> Result<SanityCheck> {
    SanityCheck::found(&regex::escape(text), source)
}

fn line(text: &str) -> String {
    format!("^{}$", regex::escape(text))
}

fn quiet_stderr() -> Result<SanityCheck> {
    not_found(r".", Source::Stderr, "no errors")
}

/// `module av` shows the current toolchain and the usual applications
fn avail_listing(current: &str) -> Result<Vec<SanityCheck>> {
    Ok(vec![
        found(&format!(" {}", regex::escape(current)), Source::Stdout, current)?,
        found(r" Python/", Source::Stdout, "Python")?,
        found(r" R/", Source::Stdout, "R")?,
        found(
            r"^If you need software that is not listed, request it at hpc@vub\.be$",
            Source::Stdout,
            "message: If you need software that is not listed",
        )?,
    ])
}

fn config_check() -> Result<Vec<SanityCheck>> {
    let mut checks = vec![SanityCheck::JsonValueFound {
        file: CONFIG_JSON.to_string(),
        pointer: "/configT/sysName".to_string(),
        source: Source::Stdout,
        msg: Some("System name".to_string()),
    }];
    for (key, expected, label) in CONFIG_VALUES {
        checks.push(SanityCheck::json_eq(CONFIG_JSON, &format!("/configT/{}", key), *expected).msg(*label));
    }
    for (key, expected, label) in CACHE_TIMES {
        checks.push(SanityCheck::json_eq(CONFIG_JSON, &format!("/configT/{}", key), *expected).msg(*label));
    }
    Ok(checks)
}

/// Load a toolchain, then locate its compiler, MPI launcher and linker
fn load_check(base: &CheckConfig, name: &str, load: &str, list: &str, toolchain: &str) -> Result<RegressionCheck> {
    let executable = [
        format!("{} {}", load, toolchain),
        list.to_string(),
        "command -v gcc".to_string(),
        "command -v mpirun".to_string(),
        "command -v ld".to_string(),
    ]
    .join(";");
    let config = base.subclass(name).with([
        Override::AppendDescr("load a module".to_string()),
        Override::Executable(executable),
        Override::PostrunCmds(vec![r#"echo $LD_LIBRARY_PATH | tr ":" "\n" >ld_lib_path"#.to_string()]),
    ]);
    let lib_path = Source::file("ld_lib_path");
    let mut sanity = vec![
        found(&line(toolchain), Source::Stdout, toolchain)?,
        found(r"^/apps/brussel/\S+/gcc$", Source::Stdout, "gcc")?,
        found(r"^/apps/brussel/\S+/mpirun$", Source::Stdout, "mpirun")?,
        found(r"^/apps/brussel/\S+/ld$", Source::Stdout, "ld")?,
    ];
    for lib in ["FFTW", "zlib", "XZ", "binutils"] {
        sanity.push(found(&format!(r"^/apps/brussel/\S+/{}/\S+/lib$", lib), lib_path.clone(), lib)?);
    }
    Ok(RegressionCheck::new(config).sanity(sanity))
}

fn check(base: &CheckConfig, name: &str, descr: &str, executable: &str) -> CheckConfig {
    base.subclass(name).with([
        Override::AppendDescr(descr.to_string()),
        Override::Executable(executable.to_string()),
    ])
}

pub fn checks(ctx: &CheckContext) -> Result<Vec<RegressionCheck>> {
    let tcgen = |months: i64| format!("foss/{}", toolchain_generation(ctx.now, months));
    let current = tcgen(-12);
    let previous = tcgen(-18);
    let loadable = tcgen(-42);

    let base = CheckConfig::new("LmodTestBase", CheckKind::Run, "test Lmod: ").with([
        Override::TimeLimit("10m".to_string()),
        Override::NumTasks(1),
        Override::NumTasksPerNode(1),
        Override::NumCpusPerTask(1),
    ]);

    let mut all = Vec::new();

    let mut config = check(
        &base,
        "LmodTestConfig",
        "configuration",
        "module --config-json 2>config.json && echo $VSC_INSTITUTE_CLUSTER-$VSC_ARCH_LOCAL$VSC_ARCH_SUFFIX",
    );
    config.logfile = Some(CONFIG_JSON.to_string());
    all.push(RegressionCheck::new(config).sanity(config_check()?));

    all.push(
        RegressionCheck::new(check(
            &base,
            "LmodTestModulepath",
            "check the MODULEPATH environment variable",
            r#"echo $MODULEPATH | tr ":" "\n""#,
        ))
        .sanity(vec![SanityCheck::EveryLine {
            pattern: crate::sanity::Pattern::new(r"/apps/brussel|/etc/modulefiles")?,
            source: Source::Stdout,
            msg: Some("module path".to_string()),
        }]),
    );

    let mut avail = avail_listing(&current)?;
    avail.push(
        SanityCheck::less_than(Extraction::float(r"^real (\S+)$", Source::Stderr)?, 5.0)
            .msg("command runs in less then 5 seconds"),
    );
    all.push(
        RegressionCheck::new(check(&base, "LmodTestAvail", "show available modules", "time -p module av"))
            .sanity(avail),
    );

    all.push(
        RegressionCheck::new(check(
            &base,
            "LmodTestSpider",
            "show available versions of a module",
            "module --terse spider foss/",
        ))
        .sanity(vec![
            found(&line(&current), Source::Stdout, &current)?,
            found(&line(&previous), Source::Stdout, &previous)?,
        ]),
    );

    all.push(load_check(&base, "LmodTestLoadmodule", "module load", "module --terse list", &loadable)?);
    all.push(load_check(&base, "LmodTestLoadml", "ml", "ml --terse", &loadable)?);

    let mut purge = check(
        &base,
        "LmodTestPurge",
        "purge all modules",
        &format!("module load {}; module purge; module list", current),
    );
    // the runner's own module is loaded, so purge first
    purge.prerun_cmds = vec![
        "module purge".to_string(),
        r#"export MANPATH="::""#.to_string(),
        r#"export |grep -v "^declare -x _" > env_prerun"#.to_string(),
    ];
    purge.postrun_cmds = vec![r#"export |grep -v "^declare -x _" > env_postrun"#.to_string()];
    all.push(RegressionCheck::new(purge).sanity(vec![
        quiet_stderr()?,
        found(r"^No modules loaded$", Source::Stdout, "message: No modules loaded")?,
        SanityCheck::FilesEqual {
            left: "env_prerun".to_string(),
            right: "env_postrun".to_string(),
            msg: Some("environment unchanged".to_string()),
        },
    ]));

    let unloaded = "FFTW";
    all.push(
        RegressionCheck::new(check(
            &base,
            "LmodTestUnload",
            "unload a module",
            &format!("module load {}; module unload {}; module --terse list", current, unloaded),
        ))
        .sanity(vec![
            quiet_stderr()?,
            found(&line(&current), Source::Stdout, &current)?,
            not_found(&line(unloaded), Source::Stdout, &format!("{} not found", unloaded))?,
        ]),
    );

    let compat_error = format!(
        "Lmod has detected the following error: A different version of the 'foss'\n\
         module is already loaded (see output of 'ml').\n\n\n{}",
        HELPDESK
    );
    all.push(
        RegressionCheck::new(check(
            &base,
            "LmodTestCompat",
            "load multiple versions of the same module",
            &format!("module load {}; module load {}; module --terse list", current, previous),
        ))
        .sanity(vec![
            message(&compat_error, Source::Stderr)?
                .msg("error message: Lmod has detected the following error"),
            found(&line(&current), Source::Stdout, &current)?,
            not_found(&line(&previous), Source::Stdout, &format!("{} not found", previous))?,
        ]),
    );

    let not_old = tcgen(-30);
    all.push(
        RegressionCheck::new(check(
            &base,
            "LmodTestNotOld",
            "load module that is not 'old' (no output)",
            &format!("module load {}", not_old),
        ))
        .sanity(vec![not_found(r".", Source::Stdout, "no output")?, quiet_stderr()?]),
    );

    let old = tcgen(-36);
    let old_notice = format!(
        "The module {} is rather old. We recommend a newer version.\n\
         If there is no newer version available, feel free to request one at hpc@vub.be.",
        old
    );
    all.push(
        RegressionCheck::new(check(
            &base,
            "LmodTestOld",
            "load old module(shows message)",
            &format!("module load {}", old),
        ))
        .sanity(vec![message(&old_notice, Source::Stderr)?]),
    );

    let very_old = tcgen(-48);
    let very_old_warning = format!(
        "Lmod Warning: The module {} is old. Please use a newer version.\n\
         If there is no newer version available, please request one at hpc@vub.be.\n\n{}",
        very_old, HELPDESK
    );
    all.push(
        RegressionCheck::new(check(
            &base,
            "LmodTestVeryOld",
            "load very old module (shows warning)",
            &format!("module load {}", very_old),
        ))
        .sanity(vec![message(&very_old_warning, Source::Stderr)?]),
    );

    all.push(
        RegressionCheck::new(check(
            &base,
            "LmodTestHidden",
            "show old module (hidden)",
            &format!("module --show-hidden av {}", old),
        ))
        .sanity(vec![message(&format!("{} (H)", old), Source::Stdout)?]),
    );

    let unknown = format!(
        "Lmod has detected the following error: The following module(s) are unknown:\n\
         \"DOESNOTEXIST\"\n\n\
         Please check the spelling or version number. Also try \"module spider ...\"\n\
         It is also possible your cache file is out-of-date; it may help to try:\n\
         \x20 $ module --ignore_cache load \"DOESNOTEXIST\"\n\n\
         Also make sure that all modulefiles written in TCL start with the string\n\
         #%Module\n\n{}",
        HELPDESK
    );
    all.push(
        RegressionCheck::new(check(
            &base,
            "LmodTestNonexisting",
            "load nonexisting module",
            "module load DOESNOTEXIST",
        ))
        .sanity(vec![message(&unknown, Source::Stderr)?]),
    );

    let cluster = format!("cluster/{}", ctx.system_name());
    all.push(
        RegressionCheck::new(check(
            &base,
            "LmodTestClusterModule",
            "show + load cluster module",
            &format!("module av {0}; module load {0}; module --terse list {0}", cluster),
        ))
        .sanity(vec![
            found(
                r"No module\(s\) or extension\(s\) found!",
                Source::Stdout,
                "message: No module(s) or extension(s) found!",
            )?,
            found(&line(&cluster), Source::Stdout, &cluster)?,
        ]),
    );

    all.push(
        RegressionCheck::new(check(
            &base,
            "LmodTestLoadLmod",
            "load a foss module and check if Lmod (lua) still works",
            &format!("module load {}; module av", loadable),
        ))
        .sanity(avail_listing(&current)?),
    );

    all.push(
        RegressionCheck::new(check(
            &base,
            "LmodTestJavaMemory",
            "memory in Java modules",
            "module load Java\nregtest probe java-memory\nhostname",
        ))
        .sanity(vec![SanityCheck::found(r"^True$", Source::Stdout)?]),
    );

    Ok(all)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::tests::context;
    use crate::sanity::{ExecutionRecord, FailureKind};
    use chrono::TimeZone;

    fn lmod(name: &str) -> RegressionCheck {
        checks(&context("hydra"))
            .unwrap()
            .into_iter()
            .find(|c| c.name() == name)
            .unwrap()
    }

    #[test]
    fn test_toolchain_generation() {
        let now = Local.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(toolchain_generation(now, 0), "2024a");
        assert_eq!(toolchain_generation(now, -12), "2023a");
        assert_eq!(toolchain_generation(now, -18), "2022b");
        assert_eq!(toolchain_generation(now, -30), "2021b");
        assert_eq!(toolchain_generation(now, -42), "2020b");

        let july = Local.with_ymd_and_hms(2024, 7, 15, 12, 0, 0).unwrap();
        assert_eq!(toolchain_generation(july, 0), "2024b");
    }

    #[test]
    fn test_config_values() {
        let json = r#"{"configT": {"sysName": "hydra-skylake", "siteName": "VUB_HPC",
            "spdr_ignore": "no", "disp_av_ext": "yes", "autoSwap": "no", "colorize": "yes",
            "disable1N": "yes", "dupPaths": "no", "exactMatch": "no", "expMCmd": "yes",
            "extendDflt": "no", "lang": "en", "lang_site": "/usr/share/lmod/etc/lang.lua",
            "ld_lib_path": "<empty>", "ld_preload": "<empty>", "pin_v": "yes", "redirect": "yes",
            "sitePkg": "/usr/share/lmod/lmod/libexec/SitePackage.lua",
            "z01_admin": "/usr/share/lmod/etc/admin.list", "spdr_loads": "no",
            "tm_ancient": 86400, "tm_short": 86400}}"#;
        let check = lmod("LmodTestConfig");
        let record = ExecutionRecord::new("hydra-skylake\n", "").with_file(CONFIG_JSON, json);
        assert!(check.evaluate(&record).passed);

        let wrong = json.replace(r#""autoSwap": "no""#, r#""autoSwap": "yes""#);
        let verdict = check.evaluate(&ExecutionRecord::new("hydra-skylake\n", "").with_file(CONFIG_JSON, wrong));
        assert!(verdict.failure.unwrap().reason.starts_with("Auto swapping"));

        let verdict = check.evaluate(&ExecutionRecord::new("hydra-broadwell\n", "").with_file(CONFIG_JSON, json));
        assert!(verdict.failure.unwrap().reason.starts_with("System name"));
    }

    #[test]
    fn test_avail_timing() {
        let stdout = " foss/2023a  Python/3.11.3  R/4.3.2\n\
                      If you need software that is not listed, request it at hpc@vub.be\n";
        let check = lmod("LmodTestAvail");
        assert!(check.evaluate(&ExecutionRecord::new(stdout, "real 1.52\nuser 0.9\n")).passed);
        let slow = check.evaluate(&ExecutionRecord::new(stdout, "real 7.10\n"));
        assert!(slow.failure.unwrap().reason.contains("less then 5 seconds"));
    }

    #[test]
    fn test_modulepath_every_entry() {
        let check = lmod("LmodTestModulepath");
        let good = "/apps/brussel/skylake/modules/2023a/all\n/etc/modulefiles/vsc\n\n";
        assert!(check.evaluate(&ExecutionRecord::new(good, "")).passed);
        let bad = format!("{}/home/user/modules\n", good);
        assert_eq!(
            check.evaluate(&ExecutionRecord::new(bad, "")).failure_kind(),
            Some(FailureKind::Sanity)
        );
    }

    #[test]
    fn test_compat_message_is_literal() {
        let stderr = format!(
            "Lmod has detected the following error: A different version of the 'foss'\n\
             module is already loaded (see output of 'ml').\n\n\n{}\n",
            HELPDESK
        );
        let verdict = lmod("LmodTestCompat")
            .evaluate(&ExecutionRecord::new("foss/2023a\nGCC/12.3.0\n", stderr));
        assert!(verdict.passed, "{:?}", verdict.failure);
    }

    #[test]
    fn test_purge_compares_environment_files() {
        let check = lmod("LmodTestPurge");
        let record = |post: &str| {
            ExecutionRecord::new("No modules loaded\n", "")
                .with_file("env_prerun", "declare -x HOME=\"/user\"\n")
                .with_file("env_postrun", post)
        };
        assert!(check.evaluate(&record("declare -x HOME=\"/user\"\n")).passed);
        let changed = check.evaluate(&record("declare -x HOME=\"/user\"\ndeclare -x FOO=\"1\"\n"));
        assert!(changed.failure.unwrap().reason.starts_with("environment unchanged"));
    }

    #[test]
    fn test_load_reads_library_path_file() {
        let check = lmod("LmodTestLoadml");
        assert!(check.config.executable.starts_with("ml foss/2020b;ml --terse;"));
        let stdout = "foss/2020b\n/apps/brussel/x/GCCcore/bin/gcc\n\
                      /apps/brussel/x/OpenMPI/bin/mpirun\n/apps/brussel/x/binutils/bin/ld\n";
        let libs = "/apps/brussel/x/FFTW/3.3.8/lib\n/apps/brussel/x/zlib/1.2.11/lib\n\
                    /apps/brussel/x/XZ/5.2.5/lib\n/apps/brussel/x/binutils/2.35/lib\n";
        let record = ExecutionRecord::new(stdout, "").with_file("ld_lib_path", libs);
        assert!(check.evaluate(&record).passed);
        let verdict = check.evaluate(&ExecutionRecord::new(stdout, ""));
        assert!(verdict.failure.unwrap().reason.starts_with("FFTW"));
    }

    #[test]
    fn test_cluster_module_follows_system() {
        let check = checks(&context("manticore"))
            .unwrap()
            .into_iter()
            .find(|c| c.name() == "LmodTestClusterModule")
            .unwrap();
        assert!(check.config.executable.starts_with("module av cluster/manticore;"));
    }

    #[test]
    fn test_hidden_marker() {
        let verdict = lmod("LmodTestHidden").evaluate(&ExecutionRecord::new("   foss/2021a (H)\n", ""));
        assert!(verdict.passed);
    }
}
