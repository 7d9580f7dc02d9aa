//! # Scripts module
//!
//! This module holds the sql and shell scripts run inside the database and
//! rest data service pods, with the markers used to classify their output.
//! Sql scripts are piped into sqlplus through `echo -e "..."`, so a `$` which
//! is not an environment variable of the pod has to be escaped.

// -----------------------------------------------------------------------------
// Markers

pub const ADMIN_USER_MARKER: &str = "USER is \"SYS\"";
pub const LOGON_DENIED: &str = "ORA-01017";
pub const USER_CONFLICT: &str = "ORA-01920";
pub const HEALTHY_MARKER: &str = "HTTP/1.1 200 OK";
pub const SCHEMA_ENABLED_MARKER: &str = "STATUS:ENABLED";
pub const APEX_VERSION_MARKER: &str = "APEXVERSION:";

// -----------------------------------------------------------------------------
// Constants

pub const SQLPLUS_CLI: &str = "sqlplus -s / as sysdba";
pub const CONFIG_DIR: &str = "/opt/oracle/ords/config/ords";
pub const INIT_CMD_PATH: &str = "/run/secrets/init-cmd";

pub const GET_PDBS: &str = "set heading off\nset feedback off\nselect name from v\\$pdbs;";

pub const GET_ORDS_STATUS: &str =
    "curl -sSkv -X GET https://localhost:8443/ords/_/db-api/stable/metadata-catalog/";

pub const DROP_ADMIN_USERS: &str = "DROP USER C##DBAPI_CDB_ADMIN CASCADE;\nDROP USER C##_DBAPI_PDB_ADMIN CASCADE;";

/// bootstrap script of the `init-ords` container, installs the rest data
/// service in the database on the first start and is a no-op afterward
pub const INIT_ORDS_CMD: &str = r#"#!/bin/bash
set -e
if [ -f /opt/oracle/ords/config/ords/defaults.xml ]; then
  echo "ORDS configuration found, skipping installation"
  exit 0
fi

umask 177
cat > /tmp/ords_params.properties <<EOF
db.hostname=${ORACLE_HOST}
db.port=${ORACLE_PORT}
db.servicename=${ORACLE_SERVICE}
db.username=${ORDS_USER}
db.password=${ORDS_PWD}
user.public.password=${ORDS_PWD}
sys.user=SYS
sys.password=${ORACLE_PWD}
schema.tablespace.default=SYSAUX
schema.tablespace.temp=TEMP
restEnabledSql.active=true
database.api.enabled=true
feature.sdw=true
standalone.mode=TRUE
standalone.use.https=true
standalone.https.port=8443
EOF

cd /opt/oracle/ords
java -jar ords.war configdir /opt/oracle/ords/config
java -jar ords.war install --parameterFile /tmp/ords_params.properties simple
rm -f /tmp/ords_params.properties
"#;

// -----------------------------------------------------------------------------
// Helpers

/// returns a shell script piping the given sql into sqlplus
pub fn sqlplus(sql: &str) -> String {
    format!("echo -e \"{}\" | {}", sql, SQLPLUS_CLI)
}

/// connects through the listener so the password is actually checked, prints
/// `USER is "SYS"` on success
pub fn validate_admin_password(password: &str) -> String {
    format!(
        "conn sys/{}@localhost:1521/${{ORACLE_SID}} as sysdba\nshow user",
        password
    )
}

pub fn set_admin_users(password: &str) -> String {
    format!(
        "CREATE USER C##DBAPI_CDB_ADMIN IDENTIFIED BY {0} CONTAINER=ALL ACCOUNT UNLOCK;\n\
         GRANT SYSDBA, CREATE SESSION TO C##DBAPI_CDB_ADMIN CONTAINER=ALL;\n\
         CREATE USER C##_DBAPI_PDB_ADMIN IDENTIFIED BY {0} CONTAINER=ALL ACCOUNT UNLOCK;\n\
         GRANT CREATE SESSION, PDB_DBA TO C##_DBAPI_PDB_ADMIN CONTAINER=ALL;",
        password
    )
}

pub fn schema_status(schema: &str, pdb: &str) -> String {
    format!(
        "alter session set container={};\nset heading off\nset feedback off\n\
         select 'STATUS:'||status from ords_metadata.ords_schemas where parsing_schema = upper('{}');",
        pdb, schema
    )
}

/// creates the schema when missing then enables or disables it
pub fn enable_schema(schema: &str, password: &str, enable: bool, url: &str, pdb: &str) -> String {
    let enabled = if enable { "TRUE" } else { "FALSE" };
    let schema = schema.to_uppercase();

    format!(
        "alter session set container={pdb};\n\
         DECLARE l_exist NUMBER; BEGIN SELECT COUNT(*) INTO l_exist FROM dba_users WHERE username = '{schema}'; \
         IF l_exist = 0 THEN EXECUTE IMMEDIATE 'CREATE USER {schema} IDENTIFIED BY {password}'; \
         EXECUTE IMMEDIATE 'GRANT CONNECT, RESOURCE, UNLIMITED TABLESPACE TO {schema}'; END IF; END;\n/\n\
         BEGIN ORDS.ENABLE_SCHEMA(p_enabled => {enabled}, p_schema => '{schema}', p_url_mapping_type => 'BASE_PATH', \
         p_url_mapping_pattern => '{url}', p_auto_rest_auth => FALSE); COMMIT; END;\n/",
    )
}

/// lists the sessions of the given user, one `sid,serial#` per line
pub fn session_info(user: &str) -> String {
    format!(
        "set heading off\nset feedback off\n\
         select sid||','||serial# from v\\$session where username = upper('{}');",
        user
    )
}

/// returns the statements killing every session listed, lines which are not
/// a `sid,serial#` pair are headers or separators and are skipped
pub fn kill_sessions<'a>(lines: impl Iterator<Item = &'a str>) -> String {
    let numeric = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());

    lines
        .filter_map(|line| line.trim().split_once(','))
        .filter(|(sid, serial)| numeric(sid) && numeric(serial))
        .map(|(sid, serial)| format!("alter system kill session '{},{}' immediate;", sid, serial))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn uninstall_ords(password: &str) -> String {
    format!(
        "cd /opt/oracle/ords && printf 'SYS AS SYSDBA\\n{}\\n' | java -jar ords.war uninstall",
        password
    )
}

pub fn install_apex(apex_password: &str, sys_password: &str, pdb: &str) -> String {
    format!(
        "cd /opt/oracle/ords/apex && echo -e \"@apexins.sql SYSAUX SYSAUX TEMP /i/\n\
         @apex_rest_config_core.sql /opt/oracle/ords/apex/ {0} {0}\n\
         ALTER USER APEX_PUBLIC_USER IDENTIFIED BY {0} ACCOUNT UNLOCK;\" \
         | sqlplus -s sys/{1}@${{ORACLE_HOST}}:${{ORACLE_PORT}}/{2} as sysdba",
        apex_password, sys_password, pdb
    )
}

/// the marker is built by concatenation so an echoed statement never matches
pub fn is_apex_installed(sys_password: &str, pdb: &str) -> String {
    format!(
        "echo -e \"set heading off\nselect 'APEX'||'VERSION:'||version from dba_registry where comp_id = 'APEX';\" \
         | sqlplus -s sys/{}@${{ORACLE_HOST}}:${{ORACLE_PORT}}/{} as sysdba",
        sys_password, pdb
    )
}

/// the `!` prefix asks the rest data service to encrypt the password on its
/// next start
pub fn set_apex_users(apex_password: &str) -> String {
    format!(
        "cd {} && for pool in apex apex_al apex_rt; do \
         [ -f conf/$pool.xml ] && sed -i 's|<entry key=\"db.password\">.*</entry>|<entry key=\"db.password\">!{}</entry>|' conf/$pool.xml; \
         done; echo done",
        CONFIG_DIR, apex_password
    )
}
