// SPDX-License-Identifier: MIT

use super::*;

#[test]
fn passwd_lines_parse() {
    let output = "\
root:x:0:0:Super-User:/root:/usr/bin/bash
webadmin:x:1001:10:Web administrator:/export/home/webadmin:/bin/bash
daemon:x:1:1::/:
";
    let entries = parse_passwd(output);
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].username, "root");
    assert_eq!(entries[0].uid, 0);
    assert_eq!(entries[1].comment, "Web administrator");
    assert_eq!(entries[1].shell, "/bin/bash");
}

#[test]
fn passwd_skips_malformed_lines() {
    assert!(parse_passwd("not-a-passwd-line\n").is_empty());
    assert!(parse_passwd("name:x:notanint:0:c:/h:/s\n").is_empty());
}

#[test]
fn group_lines_parse_members() {
    let output = "\
staff:x:10:webadmin,operator
empty:x:1200:
";
    let entries = parse_group(output);
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].members, vec!["webadmin", "operator"]);
    assert!(entries[1].members.is_empty());
}

#[test]
fn user_attr_attributes_split() {
    let output = "\
# comment line
root::::type=normal;auths=solaris.*;profiles=All;lock_after_retries=no
backupadmin::::type=role;profiles=Media Backup,Media Restore
";
    let entries = parse_user_attr(output);
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].entry_type(), Some("normal"));
    assert_eq!(entries[0].attribute_list("auths"), vec!["solaris.*"]);
    assert_eq!(entries[1].entry_type(), Some("role"));
    assert_eq!(
        entries[1].attribute_list("profiles"),
        vec!["Media Backup", "Media Restore"]
    );
}

#[test]
fn auth_attr_descriptions() {
    let output = "\
solaris.admin.usermgr.read:::View Users and Roles::help=AuthUsermgrRead.html
solaris.admin.usermgr.write:::Manage Users::
";
    let entries = parse_auth_attr(output);
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].name, "solaris.admin.usermgr.read");
    assert_eq!(entries[0].short_desc, "View Users and Roles");
}

#[test]
fn prof_attr_attributes() {
    let output = "\
Media Backup:::Backup files and file systems:auths=solaris.smf.manage;help=RtMediaBkup.html
";
    let entries = parse_prof_attr(output);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "Media Backup");
    assert_eq!(entries[0].description, "Backup files and file systems");
    assert_eq!(entries[0].attributes.get("auths").map(String::as_str), Some("solaris.smf.manage"));
}

#[test]
fn comments_and_blanks_are_ignored() {
    let output = "\n# only comments\n\n";
    assert!(parse_user_attr(output).is_empty());
    assert!(parse_auth_attr(output).is_empty());
    assert!(parse_prof_attr(output).is_empty());
}
