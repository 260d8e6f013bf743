use async_trait::async_trait;

use crate::connection::RunOpts;
use crate::error::FabError;
use crate::files::{ensure_line, exists};
use crate::tasks::{Param, ParamKind, Task, TaskContext};
use crate::version::Version;

const SYSCTL_CONF: &str = "/etc/sysctl.conf";
const SYSTEMD_CONF: &str = "/etc/systemd/system.conf";

const BASE_PACKAGES: &[&str] = &[
    "git",
    "unzip",
    "curl",
    "wget",
    "tar",
    "sudo",
    "zip",
    "sqlite3",
    "tmux",
    "ntp",
    "build-essential",
    "gettext",
    "libcap2-bin",
    "netcat-traditional",
    "silversearcher-ag",
    "htop",
    "jq",
    "dirmngr",
    "cron",
    "rsync",
    "locales",
    "net-tools",
];

const LIMITS_CONF: &str = "\
*    soft    nofile  500000
*    hard    nofile  500000
root soft    nofile  500000
root hard    nofile  500000
";

const PAM_SESSION_FILES: &[&str] = &[
    "/etc/pam.d/common-session",
    "/etc/pam.d/common-session-noninteractive",
];
const PAM_LIMITS: &str = "session required pam_limits.so";

const SYSCTL_TUNING: &[&str] = &[
    "vm.overcommit_memory = 1",
    "net.core.somaxconn = 65535",
    "fs.file-max = 6553560",
];

const SYSCTL_NO_IPV6: &[&str] = &[
    "net.ipv6.conf.all.disable_ipv6 = 1",
    "net.ipv6.conf.default.disable_ipv6 = 1",
    "net.ipv6.conf.lo.disable_ipv6 = 1",
];

const SYSCTL_BBR: &[&str] = &[
    "net.core.default_qdisc = fq",
    "net.ipv4.tcp_congestion_control = bbr",
];

const BBR_MIN_KERNEL: &str = "4.9";

const DOTFILES_URL: &str =
    "https://github.com/ichuan/dotfiles/releases/latest/download/dotfiles.tar.gz";

pub struct Debian;

#[async_trait]
impl Task for Debian {
    fn name(&self) -> &'static str {
        "debian"
    }

    fn about(&self) -> &'static str {
        "Set up a Debian server"
    }

    async fn run(&self, ctx: &TaskContext<'_>) -> Result<(), FabError> {
        let conn = ctx.conn;

        // Minimal images may ship without sudo; that only works as root.
        if !conn.check("which sudo").await? {
            conn.run("apt-get install sudo -y").await?;
        }

        conn.sudo("apt-get update -yq").await?;
        conn.sudo(
            "DEBIAN_FRONTEND=noninteractive apt-get -yq \
             -o Dpkg::Options::=\"--force-confdef\" \
             -o Dpkg::Options::=\"--force-confold\" upgrade",
        )
        .await?;
        conn.sudo(&format!("apt-get install -yq {}", BASE_PACKAGES.join(" ")))
            .await?;
        conn.run_with(
            "apt-get install -yq software-properties-common",
            RunOpts::warn().sudo(),
        )
        .await?;

        Dotfiles.run(ctx).await?;

        conn.run_with(
            "cp /usr/share/zoneinfo/UTC /etc/localtime",
            RunOpts::warn().sudo(),
        )
        .await?;

        // Max open files.
        conn.write_file(LIMITS_CONF.as_bytes(), "/etc/security/limits.conf", true)
            .await?;
        for path in PAM_SESSION_FILES {
            if exists(conn, path).await? {
                ensure_line(conn, path, PAM_LIMITS).await?;
            }
        }
        if exists(conn, SYSTEMD_CONF).await? {
            conn.run_with(
                &format!(
                    "sed -i \"s/^#DefaultLimitNOFILE=.*/DefaultLimitNOFILE=500000/g\" {}",
                    SYSTEMD_CONF
                ),
                RunOpts::warn().sudo(),
            )
            .await?;
        }

        for line in SYSCTL_TUNING {
            ensure_line(conn, SYSCTL_CONF, line).await?;
        }
        conn.sudo("sysctl -p").await?;

        // Ubuntu only.
        conn.run_with(
            "sed -i 's/^Prompt.*/Prompt=never/' /etc/update-manager/release-upgrades",
            RunOpts::warn().sudo(),
        )
        .await?;

        conn.write_file(b"en_US.UTF-8 UTF-8\n", "/etc/locale.gen", true)
            .await?;
        conn.sudo("locale-gen en_US.UTF-8").await?;

        Bbr.run(ctx).await?;

        for line in SYSCTL_NO_IPV6 {
            ensure_line(conn, SYSCTL_CONF, line).await?;
        }
        conn.sudo("sysctl -p").await?;
        Ok(())
    }
}

pub struct Dotfiles;

#[async_trait]
impl Task for Dotfiles {
    fn name(&self) -> &'static str {
        "dotfiles"
    }

    fn about(&self) -> &'static str {
        "Install dotfiles unless ~/.tmux.conf exists"
    }

    async fn run(&self, ctx: &TaskContext<'_>) -> Result<(), FabError> {
        let install = ctx.render_with(
            "[ ! -f ~/.tmux.conf ] && { wget {{url}} -O - | tar xzf - && bash dotfiles/bootstrap.sh -f; }",
            &[("url", DOTFILES_URL)],
        )?;
        ctx.conn.run_with(&install, RunOpts::warn()).await?;
        ctx.conn
            .run("rm -rf dotfiles ~/Tomorrow_Night_Bright.terminal ~/iTerm.profile.json")
            .await?;
        Ok(())
    }
}

pub struct Bbr;

#[async_trait]
impl Task for Bbr {
    fn name(&self) -> &'static str {
        "bbr"
    }

    fn about(&self) -> &'static str {
        "Enable Google BBR congestion control (https://github.com/google/bbr)"
    }

    async fn run(&self, ctx: &TaskContext<'_>) -> Result<(), FabError> {
        let conn = ctx.conn;
        if conn
            .sudo_check("sysctl net.ipv4.tcp_available_congestion_control | grep -q bbr")
            .await?
        {
            ctx.note("bbr already enabled");
            return Ok(());
        }

        let kernel = Version::parse(&conn.output("uname -r").await?)?;
        if kernel < Version::parse(BBR_MIN_KERNEL)? {
            ctx.note(&format!(
                "bbr needs Linux {}+ (found {}), please upgrade your kernel",
                BBR_MIN_KERNEL, kernel
            ));
            return Ok(());
        }

        for line in SYSCTL_BBR {
            ensure_line(conn, SYSCTL_CONF, line).await?;
        }
        conn.sudo("sysctl -p").await?;
        Ok(())
    }
}

const SWAP_PARAMS: &[Param] = &[Param {
    name: "gb",
    short: Some('g'),
    help: "Size of the swapfile (GB)",
    kind: ParamKind::Int,
    default: Some("1"),
    validate: Some(at_least_one_gb),
}];

fn at_least_one_gb(value: &str) -> Result<(), String> {
    match value.parse::<u64>() {
        Ok(0) => Err("swap size must be at least 1 GB".to_string()),
        _ => Ok(()),
    }
}

const SWAP_CREATE: &[&str] = &[
    "fallocate -l {{gb}}G {{path}}",
    "chmod 600 {{path}}",
    "mkswap {{path}}",
    "swapon {{path}}",
];

const SWAP_FSTAB: &str = "{{path}} none swap sw 0 0";

pub struct Swap;

#[async_trait]
impl Task for Swap {
    fn name(&self) -> &'static str {
        "swap"
    }

    fn about(&self) -> &'static str {
        "Install a swapfile, default to 1GB"
    }

    fn params(&self) -> &'static [Param] {
        SWAP_PARAMS
    }

    async fn run(&self, ctx: &TaskContext<'_>) -> Result<(), FabError> {
        let conn = ctx.conn;
        let gb = ctx.args.int("gb")?;
        let path = format!("/swap{}G", gb);

        if conn.check(&format!("test -f {}", path)).await? {
            ctx.note(&format!("{} already exists", path));
            return Ok(());
        }

        for template in SWAP_CREATE {
            conn.sudo(&ctx.render_with(template, &[("path", &path)])?)
                .await?;
        }
        ensure_line(conn, SYSCTL_CONF, "vm.swappiness=10").await?;
        let fstab = ctx.render_with(SWAP_FSTAB, &[("path", &path)])?;
        ensure_line(conn, "/etc/fstab", &fstab).await?;
        Ok(())
    }
}
