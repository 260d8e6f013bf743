use async_trait::async_trait;
use serde::Deserialize;

use crate::connection::RunOpts;
use crate::error::FabError;
use crate::files::exists;
use crate::tasks::{Param, ParamKind, Task, TaskContext};
use crate::version::Version;

const NODE_INDEX_URL: &str = "https://registry.npmmirror.com/-/binary/node/index.json";
const NODE_DIST_URL: &str =
    "https://nodejs.org/dist/latest-{{codename}}/node-{{version}}-linux-x64.tar.xz";

#[derive(Debug, Deserialize)]
struct NodeRelease {
    version: String,
    /// `false`, or the LTS codename.
    #[serde(default)]
    lts: serde_json::Value,
}

/// Picks the highest LTS release from a Node.js `index.json`.
/// Returns the version and the lowercased LTS codename.
fn latest_lts(index: &str) -> Result<(Version, String), FabError> {
    let releases: Vec<NodeRelease> = serde_json::from_str(index)?;
    let mut latest: Option<(Version, String)> = None;
    for release in releases {
        let codename = match release.lts.as_str() {
            Some(codename) => codename,
            None => continue,
        };
        let version = Version::parse(&release.version)?;
        if latest.as_ref().map_or(true, |(best, _)| version > *best) {
            latest = Some((version, codename.to_lowercase()));
        }
    }
    latest.ok_or_else(|| FabError::MissingRelease("no Node.js LTS release in index".to_string()))
}

pub struct Nodejs;

#[async_trait]
impl Task for Nodejs {
    fn name(&self) -> &'static str {
        "nodejs"
    }

    fn about(&self) -> &'static str {
        "Install the latest Node.js LTS"
    }

    async fn run(&self, ctx: &TaskContext<'_>) -> Result<(), FabError> {
        let conn = ctx.conn;
        // The index is fetched by the host itself, with the same wget as the download.
        let index = conn
            .output(&format!("wget -qO- --tries 3 {}", NODE_INDEX_URL))
            .await?;
        let (version, codename) = latest_lts(&index)?;
        let version = version.to_string();
        let params = [("version", version.as_str()), ("codename", codename.as_str())];

        let installed = ctx.render_with(
            "which node && test \"$(node --version)\" = {{quote version}}",
            &params,
        )?;
        if conn.check(&installed).await? {
            ctx.note(&format!("Node.js {} already installed", version));
            return Ok(());
        }

        let url = ctx.render_with(NODE_DIST_URL, &params)?;
        conn.run(&format!("wget -O /tmp/node.tar.xz --tries 3 {}", url))
            .await?;
        conn.sudo(
            "tar -C /usr/ --exclude CHANGELOG.md --exclude LICENSE \
             --exclude README.md --strip-components 1 -xf /tmp/node.tar.xz",
        )
        .await?;
        Ok(())
    }
}

const DOCKER_PACKAGES: &[&str] = &[
    "docker-ce",
    "docker-ce-cli",
    "containerd.io",
    "docker-compose-plugin",
];

const DOCKER_APT_SOURCE: &str = "deb [arch=amd64 signed-by=/etc/apt/keyrings/docker.asc] \
     https://download.docker.com/linux/debian {{codename}} stable\n";

const DOCKER_DAEMON_JSON: &str = r#"{
  "log-driver": "json-file",
  "log-opts": {
    "max-size": "100m",
    "max-file": "5"
  }
}
"#;

pub struct Docker;

#[async_trait]
impl Task for Docker {
    fn name(&self) -> &'static str {
        "docker"
    }

    fn about(&self) -> &'static str {
        "Install docker and docker compose on debian/ubuntu"
    }

    async fn run(&self, ctx: &TaskContext<'_>) -> Result<(), FabError> {
        let conn = ctx.conn;
        if conn.check("which docker").await? {
            ctx.note("docker already installed");
            return Ok(());
        }

        // https://docs.docker.com/engine/install/debian/
        conn.sudo("apt update -yq").await?;
        conn.sudo("apt install -yq apt-transport-https ca-certificates curl")
            .await?;
        conn.sudo("install -m 0755 -d /etc/apt/keyrings").await?;
        conn.sudo(
            "curl -fsSL https://download.docker.com/linux/debian/gpg \
             -o /etc/apt/keyrings/docker.asc",
        )
        .await?;
        conn.sudo("chmod a+r /etc/apt/keyrings/docker.asc").await?;

        let codename = conn.output("lsb_release -sc").await?;
        let source = ctx.render_with(DOCKER_APT_SOURCE, &[("codename", &codename)])?;
        conn.write_file(source.as_bytes(), "/etc/apt/sources.list.d/docker.list", true)
            .await?;
        conn.sudo("apt update -yq").await?;
        conn.sudo(&format!("apt install -yq {}", DOCKER_PACKAGES.join(" ")))
            .await?;

        // Log rotation.
        conn.write_file(DOCKER_DAEMON_JSON.as_bytes(), "/etc/docker/daemon.json", true)
            .await?;
        conn.run_with("service docker restart", RunOpts::warn().sudo())
            .await?;

        if !conn.check("test \"$USER\" = root").await? {
            conn.run_with("sudo usermod -a -G docker \"$USER\"", RunOpts::warn())
                .await?;
        }
        Ok(())
    }
}

const PYTHON_PARAMS: &[Param] = &[Param {
    name: "version",
    short: Some('v'),
    help: "Which latest version to install",
    kind: ParamKind::Str,
    default: Some("3"),
    validate: None,
}];

const PYTHON_BUILD_DEPS: &[&str] = &[
    "build-essential",
    "checkinstall",
    "libncursesw5-dev",
    "libssl-dev",
    "libsqlite3-dev",
    "tk-dev",
    "libgdbm-dev",
    "libc6-dev",
    "libbz2-dev",
    "libffi-dev",
    "libreadline-dev",
    "liblzma-dev",
    "zlib1g-dev",
];

const PYENV_PROFILE: &str = r#"cat >> ~/.bash_profile <<'EOF'
export PYENV_ROOT="$HOME/.pyenv"
export PATH="$PYENV_ROOT/bin:$PATH"
command -v pyenv > /dev/null && eval "$(pyenv init --path)"
EOF"#;

const POETRY_INSTALL: &str = r#"export PATH="$HOME/.pyenv/bin:$PATH"
export PYENV_VERSION=`pyenv versions --bare --skip-aliases | sort -V | tail -n 1`
curl -sSL https://install.python-poetry.org | pyenv exec python -
echo "export PATH=\"\$HOME/.local/bin:\$PATH\"" >> ~/.bash_profile
echo "export POETRY_VIRTUALENVS_IN_PROJECT=true" >> ~/.bash_profile
echo "export POETRY_VIRTUALENVS_PREFER_ACTIVE_PYTHON=true" >> ~/.bash_profile"#;

pub struct Python;

#[async_trait]
impl Task for Python {
    fn name(&self) -> &'static str {
        "python"
    }

    fn about(&self) -> &'static str {
        "Install pyenv, the latest python3 and poetry"
    }

    fn params(&self) -> &'static [Param] {
        PYTHON_PARAMS
    }

    async fn run(&self, ctx: &TaskContext<'_>) -> Result<(), FabError> {
        let conn = ctx.conn;
        if !exists(conn, "~/.pyenv").await? {
            conn.run("curl https://pyenv.run | bash").await?;
            conn.sudo("apt update -yq").await?;
            conn.sudo(&format!("apt install -y {}", PYTHON_BUILD_DEPS.join(" ")))
                .await?;
            if !conn
                .check("test -f ~/.bash_profile && grep -q pyenv ~/.bash_profile")
                .await?
            {
                conn.run(PYENV_PROFILE).await?;
            }
        }
        let install = ctx.render(". ~/.bash_profile && pyenv install {{quote version}}:latest")?;
        conn.run_with(&install, RunOpts::warn()).await?;
        conn.run(POETRY_INSTALL).await?;
        Ok(())
    }
}

const TROJAN_PARAMS: &[Param] = &[
    Param {
        name: "domain",
        short: Some('d'),
        help: "A domain name pointing to the server executing this task",
        kind: ParamKind::Str,
        default: None,
        validate: Some(domain_name),
    },
    Param {
        name: "password",
        short: Some('p'),
        help: "Password of the proxy. Will generate a new one if not provided",
        kind: ParamKind::Str,
        default: Some(""),
        validate: None,
    },
];

/// Domains end up unquoted in the certificate command.
fn domain_name(value: &str) -> Result<(), String> {
    let valid = !value.is_empty()
        && !value.starts_with(|c| c == '.' || c == '-')
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(format!("'{}' is not a domain name", value))
    }
}

const TROJAN_DIR: &str = "$HOME/trojan";
const TROJAN_IMAGE: &str = "ghcr.io/ichuan/trojan-docker";

const TROJAN_VOLUME: &str = "docker volume create --driver local --opt type=none \
     --opt device={{dir}}/acme.sh --opt o=bind acme.sh";

const TROJAN_CERT: &str = "docker run -i --rm --name acme.sh -p 80:80 -v acme.sh:/root/.acme.sh \
     --entrypoint bash {{image}} -c \
     \"/etc/init.d/nginx start ; /root/.acme.sh/acme.sh --home /root/.acme.sh \
     --issue --server letsencrypt -d {{domain}} -w /var/www/html\"";

const TROJAN_START: &str = "#!/bin/bash
docker run --restart always -id --name trojan -p 443:443 -p 80:80 \
-v acme.sh:/root/.acme.sh -e DOMAIN={{quote domain}} -e PASSWORD={{quote password}} {{image}}
";

const RANDOM_HEX_16: &str = "head -c 16 /dev/urandom | od -An -tx1 | tr -d ' \\n'";

pub struct Trojan;

#[async_trait]
impl Task for Trojan {
    fn name(&self) -> &'static str {
        "trojan"
    }

    fn about(&self) -> &'static str {
        "Install a trojan proxy (requires docker and a domain name)"
    }

    fn params(&self) -> &'static [Param] {
        TROJAN_PARAMS
    }

    async fn run(&self, ctx: &TaskContext<'_>) -> Result<(), FabError> {
        let conn = ctx.conn;
        // The domain is rendered from the task arguments, already checked
        // by `domain_name`.
        if exists(conn, TROJAN_DIR).await? {
            ctx.note("trojan already installed");
            return Ok(());
        }

        let mut password = ctx.args.str("password")?.to_string();
        if password.is_empty() {
            password = conn.output(RANDOM_HEX_16).await?;
            ctx.note(&format!("Generated password: {}", password));
        }
        let params = [
            ("dir", TROJAN_DIR),
            ("image", TROJAN_IMAGE),
            ("password", password.as_str()),
        ];

        conn.run_with(
            &format!("mkdir -p {dir} {dir}/acme.sh", dir = TROJAN_DIR),
            RunOpts::warn(),
        )
        .await?;
        conn.run(&ctx.render_with(TROJAN_VOLUME, &params)?).await?;
        // Fetching SSL certs.
        conn.run(&ctx.render_with(TROJAN_CERT, &params)?).await?;

        let start = format!("{}/start.sh", TROJAN_DIR);
        let script = ctx.render_with(TROJAN_START, &params)?;
        conn.write_file(script.as_bytes(), &start, false).await?;
        conn.run(&format!("chmod +x {start} && {start}", start = start))
            .await?;
        ctx.note(&format!("Done. Remember the password: {}", password));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INDEX: &str = r#"[
        {"version": "v21.6.1", "date": "2024-01-22", "lts": false},
        {"version": "v20.11.0", "date": "2024-01-09", "lts": "Iron"},
        {"version": "v20.9.0", "date": "2023-10-24", "lts": "Iron"},
        {"version": "v18.19.0", "date": "2023-11-29", "lts": "Hydrogen"},
        {"version": "v0.1.14"}
    ]"#;

    #[test]
    fn test_latest_lts_skips_current_releases() {
        let (version, codename) = latest_lts(INDEX).unwrap();
        assert_eq!(version.to_string(), "v20.11.0");
        assert_eq!(codename, "iron");
    }

    #[test]
    fn test_latest_lts_without_any_lts() {
        assert!(matches!(
            latest_lts(r#"[{"version": "v21.0.0", "lts": false}]"#),
            Err(FabError::MissingRelease(_))
        ));
        assert!(matches!(latest_lts("not json"), Err(FabError::JsonError(_))));
    }
}
