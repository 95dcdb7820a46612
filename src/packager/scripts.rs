//! Maintainer script templates.
//!
//! The post-install and post-remove scripts only register or unregister the
//! installed shell in `/etc/shells`. Ubuntu delegates to `add-shell` /
//! `remove-shell`; the RedHat family edits the file directly.

use handlebars::Handlebars;
use serde::Serialize;

use super::error::Result;

const REDHAT_AFTER_INSTALL: &str = r#"#!/bin/sh
if [ ! -f /etc/shells ] ; then
    echo "{{shell_path}}" > /etc/shells
else
    grep -q "^{{shell_path}}$" /etc/shells || echo "{{shell_path}}" >> /etc/shells
fi
"#;

const REDHAT_AFTER_REMOVE: &str = r#"#!/bin/sh
if [ "$1" = 0 ] ; then
    if [ -f /etc/shells ] ; then
        TmpFile=`/bin/mktemp /tmp/.powershellmXXXXXX`
        grep -v '^{{shell_path}}$' /etc/shells > $TmpFile
        cp -f $TmpFile /etc/shells
        rm -f $TmpFile
    fi
fi
"#;

const UBUNTU_AFTER_INSTALL: &str = r#"#!/bin/sh
set -e
case "$1" in
    (configure)
        add-shell "{{shell_path}}"
    ;;
    (abort-upgrade|abort-remove|abort-deconfigure)
        exit 0
    ;;
    (*)
        echo "postinst called with unknown argument '$1'" >&2
        exit 0
    ;;
esac
"#;

const UBUNTU_AFTER_REMOVE: &str = r#"#!/bin/sh
set -e
case "$1" in
    (remove)
        remove-shell "{{shell_path}}"
    ;;
esac
"#;

/// Which template pair to render.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ScriptFlavor {
    /// dpkg maintainer scripts
    Ubuntu,
    /// rpm scriptlets
    RedHat,
}

/// Rendered post-install and post-remove scripts.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MaintainerScripts {
    /// Script run after installation.
    pub after_install: String,
    /// Script run after removal.
    pub after_remove: String,
}

#[derive(Serialize)]
struct ScriptData<'a> {
    shell_path: &'a str,
}

/// Renders both scripts for the shell installed at `shell_path`.
pub fn render(flavor: ScriptFlavor, shell_path: &str) -> Result<MaintainerScripts> {
    let mut handlebars = Handlebars::new();
    handlebars.register_escape_fn(handlebars::no_escape);
    handlebars.set_strict_mode(true);

    let (install, remove) = match flavor {
        ScriptFlavor::Ubuntu => (UBUNTU_AFTER_INSTALL, UBUNTU_AFTER_REMOVE),
        ScriptFlavor::RedHat => (REDHAT_AFTER_INSTALL, REDHAT_AFTER_REMOVE),
    };
    handlebars.register_template_string("after_install", install)?;
    handlebars.register_template_string("after_remove", remove)?;

    let data = ScriptData { shell_path };
    Ok(MaintainerScripts {
        after_install: handlebars.render("after_install", &data)?,
        after_remove: handlebars.render("after_remove", &data)?,
    })
}
