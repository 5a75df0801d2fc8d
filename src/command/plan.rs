//! Script templates submitted through the in-guest run-command facility.

use serde_json::{Value, json};
use shell_escape::unix::escape;

use crate::request::{OsType, ValidationError};

/// Run-command identifier for Linux guests.
pub const RUN_SHELL_SCRIPT: &str = "RunShellScript";
/// Run-command identifier for Windows guests.
pub const RUN_POWERSHELL_SCRIPT: &str = "RunPowerShellScript";

const LINUX_RUNNING_MARKER: &str = "active (running)";
const WINDOWS_RUNNING_MARKER: &str = "Running";

/// Default sampling window for process utilisation.
pub const DEFAULT_SAMPLE_SECONDS: u32 = 5;
/// Default number of processes reported.
pub const DEFAULT_TOP_N: u32 = 15;
const MAX_SAMPLE_SECONDS: u32 = 60;
const MAX_TOP_N: u32 = 100;

/// Script ready to be posted to the run-command endpoint.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RunCommandScript {
    /// `RunShellScript` or `RunPowerShellScript`.
    pub command_id: &'static str,
    /// Script lines.
    pub lines: Vec<String>,
}

impl RunCommandScript {
    fn new(os_type: OsType, script: &str) -> Self {
        Self {
            command_id: command_id(os_type),
            lines: script.lines().map(str::to_owned).collect(),
        }
    }

    /// Renders the run-command request body.
    #[must_use]
    pub fn body(&self) -> Value {
        json!({
            "commandId": self.command_id,
            "script": self.lines,
        })
    }
}

const fn command_id(os_type: OsType) -> &'static str {
    match os_type {
        OsType::Linux => RUN_SHELL_SCRIPT,
        OsType::Windows => RUN_POWERSHELL_SCRIPT,
    }
}

/// Restart command and its follow-up status query for one service.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServiceRestartPlan {
    /// Guest operating system.
    pub os_type: OsType,
    /// Service being restarted.
    pub service_name: String,
    /// Command that restarts the service.
    pub command_text: String,
    /// Read-only query reporting the service state.
    pub status_query: String,
    /// Text the status query prints when the service is running.
    pub running_marker: &'static str,
}

impl ServiceRestartPlan {
    /// Chooses the template for `os_type` and embeds the escaped service
    /// name.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] when the service name is blank or contains
    /// control characters.
    pub fn new(os_type: OsType, requested: &str) -> Result<Self, ValidationError> {
        let service_name = validate_service_name(requested)?;
        let (command_text, status_query, running_marker) = match os_type {
            OsType::Linux => {
                let quoted = escape(service_name.as_str().into());
                (
                    format!("systemctl restart {quoted}"),
                    format!("systemctl status {quoted} --no-pager"),
                    LINUX_RUNNING_MARKER,
                )
            }
            OsType::Windows => {
                let quoted = powershell_quote(&service_name);
                (
                    format!("Restart-Service -Name {quoted} -Force -ErrorAction Stop"),
                    format!("(Get-Service -Name {quoted} -ErrorAction Stop).Status"),
                    WINDOWS_RUNNING_MARKER,
                )
            }
        };
        Ok(Self {
            os_type,
            service_name,
            command_text,
            status_query,
            running_marker,
        })
    }

    /// Script submitted to restart the service.
    #[must_use]
    pub fn restart_script(&self) -> RunCommandScript {
        RunCommandScript::new(self.os_type, &self.command_text)
    }

    /// Script submitted to query the service state.
    #[must_use]
    pub fn status_script(&self) -> RunCommandScript {
        RunCommandScript::new(self.os_type, &self.status_query)
    }

    /// Returns `true` when `output` shows the service running.
    #[must_use]
    pub fn is_running(&self, output: &str) -> bool {
        output.contains(self.running_marker)
    }
}

/// Trims and checks a service name before it is embedded in a script.
///
/// # Errors
///
/// Returns [`ValidationError::MissingField`] for blank names and
/// [`ValidationError::InvalidName`] when control characters are present.
pub fn validate_service_name(value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingField(String::from("service_name")));
    }
    if trimmed.chars().any(char::is_control) {
        return Err(ValidationError::InvalidName {
            field: String::from("service_name"),
            reason: String::from("must not contain control characters"),
        });
    }
    Ok(trimmed.to_owned())
}

fn powershell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Two-snapshot process sampling script reporting the top consumers as JSON.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProcessSamplePlan {
    /// Guest operating system.
    pub os_type: OsType,
    /// Seconds between the two snapshots.
    pub sample_seconds: u32,
    /// Number of processes reported.
    pub top_n: u32,
    /// Rendered script.
    pub script: String,
}

impl ProcessSamplePlan {
    /// Builds the sampling script for `vm_name`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidNumber`] when `sample_seconds` is
    /// outside `1..=60` or `top_n` is outside `1..=100`.
    pub fn new(
        os_type: OsType,
        vm_name: &str,
        sample_seconds: u32,
        top_n: u32,
    ) -> Result<Self, ValidationError> {
        check_range("sample_seconds", sample_seconds, MAX_SAMPLE_SECONDS)?;
        check_range("top_n", top_n, MAX_TOP_N)?;
        let script = match os_type {
            OsType::Linux => linux_sample_script(vm_name, sample_seconds, top_n),
            OsType::Windows => windows_sample_script(vm_name, sample_seconds, top_n),
        };
        Ok(Self {
            os_type,
            sample_seconds,
            top_n,
            script,
        })
    }

    /// Script submitted through run-command.
    #[must_use]
    pub fn run_script(&self) -> RunCommandScript {
        RunCommandScript::new(self.os_type, &self.script)
    }
}

fn check_range(field: &str, value: u32, max: u32) -> Result<(), ValidationError> {
    if (1..=max).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::InvalidNumber {
            field: field.to_owned(),
            reason: format!("must be between 1 and {max}, got {value}"),
        })
    }
}

fn linux_sample_script(vm_name: &str, sample_seconds: u32, top_n: u32) -> String {
    let vm = escape(vm_name.into());
    format!(
        r#"SAMPLE_SECONDS={sample_seconds}
TOP_N={top_n}
CPU_CORES=$(nproc)
TOTAL_MEM_KB=$(awk '/MemTotal/ {{print $2}}' /proc/meminfo)
sleep "$SAMPLE_SECONDS"
ps -eo pid,comm,pcpu,pmem,rss --sort=-pcpu | tail -n +2 | head -n "$TOP_N" | awk -v vm={vm} -v cores="$CPU_CORES" -v mem_kb="$TOTAL_MEM_KB" -v secs="$SAMPLE_SECONDS" '
BEGIN {{ printf "{{\"success\": true, \"vm_name\": \"%s\", \"os_type\": \"linux\", \"sample_seconds\": %d, \"cpu_cores\": %d, \"total_memory_gb\": %.2f, \"processes\": [", vm, secs, cores, mem_kb / 1048576 }}
{{ if (NR > 1) printf ", "; printf "{{\"process_name\": \"%s\", \"pid\": %d, \"cpu_percent\": %s, \"memory_mb\": %.2f, \"memory_percent\": %s}}", $2, $1, $3, $5 / 1024, $4 }}
END {{ print "]}}" }}'"#
    )
}

fn windows_sample_script(vm_name: &str, sample_seconds: u32, top_n: u32) -> String {
    let vm = powershell_quote(vm_name);
    format!(
        r"$SampleSeconds = {sample_seconds}
$TopN = {top_n}
$first = Get-Process | Select-Object Id, Name, CPU, WorkingSet64
Start-Sleep -Seconds $SampleSeconds
$second = Get-Process | Select-Object Id, Name, CPU, WorkingSet64
$cpuCount = (Get-CimInstance Win32_ComputerSystem).NumberOfLogicalProcessors
$totalMem = (Get-CimInstance Win32_OperatingSystem).TotalVisibleMemorySize * 1KB
$processes = foreach ($p2 in $second) {{
    $p1 = $first | Where-Object {{ $_.Id -eq $p2.Id }}
    if ($p1 -and $p2.CPU -ne $null) {{
        [PSCustomObject]@{{
            process_name = $p2.Name
            pid = $p2.Id
            cpu_percent = [math]::Round((($p2.CPU - $p1.CPU) / $SampleSeconds / $cpuCount) * 100, 2)
            memory_mb = [math]::Round($p2.WorkingSet64 / 1MB, 2)
            memory_percent = [math]::Round(($p2.WorkingSet64 / $totalMem) * 100, 2)
        }}
    }}
}}
@{{
    success = $true
    vm_name = {vm}
    os_type = 'windows'
    sample_seconds = $SampleSeconds
    cpu_cores = $cpuCount
    total_memory_gb = [math]::Round($totalMem / 1GB, 2)
    processes = @($processes | Sort-Object -Property cpu_percent -Descending | Select-Object -First $TopN)
}} | ConvertTo-Json -Depth 3"
    )
}
