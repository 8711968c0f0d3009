//! Source code disclosure

use std::sync::OnceLock;

use regex::Regex;

use crate::http::HttpMessage;
use crate::scanner::findings::{Confidence, Finding, Severity};
use crate::scanner::passive::{AlertThreshold, PassiveRule};

/// Language signatures, tried in order
const LANGUAGE_PATTERNS: &[(&str, &str)] = &[
    ("PHP", r"(?s)<\?php\s*.+?;\s*\?>"),
    ("PHP", r"<\?=\s*.+?\s*\?>"),
    ("PHP", r"\$_POST\s*\["),
    ("PHP", r"\$_GET\s*\["),
    ("PHP", r"(?s)<\?php\s*.+?;"),
    ("JSP", r"<%@\s*page\s+.+?%>"),
    ("JSP", r"<%@\s*include.+?%>"),
    ("JSP", r"<%@\s*taglib.+?%>"),
    ("JSP", r"<jsp:directive\.(?:page|include|taglib).+?>"),
    ("Servlet", r"import\s+javax\.servlet\.http\.HttpServlet\s*;"),
    ("Servlet", r"import\s+javax\.servlet\.http\.\*\s*;"),
    ("Servlet", r#"(?i)@WebServlet\s*\(\s*"/[a-z0-9]+"\s*\)"#),
    ("Servlet", r"(?i)public\s+class\s+[a-z0-9]+\s+extends\s+(?:javax\.servlet\.http\.)?HttpServlet"),
    (
        "Servlet",
        r"public\s+void\s+doGet\s*\(\s*HttpServletRequest\s+[a-z0-9]+\s*,\s*HttpServletResponse\s+[a-z0-9]+\s*\)",
    ),
    (
        "Servlet",
        r"public\s+void\s+doPost\s*\(\s*HttpServletRequest\s+[a-z0-9]+\s*,\s*HttpServletResponse\s+[a-z0-9]+\s*\)",
    ),
    ("Java", r"(?i)^package\s+[a-z0-9.]+;"),
    ("Java", r"(?i)^import\s+[a-z0-9.]+;"),
    ("Java", r"(?s)class\s+[a-z0-9]+\s*\{.+\}"),
    ("Java", r"public\s+static\s+void\s+main\s*\(\s*String\s+[a-z0-9]+\s*\[\s*\]\s*\)\s*\{"),
    ("Java", r"public\s+static\s+void\s+main\s*\(\s*String\s*\[\s*\]\s*[a-z0-9]+\s*\)\s*\{"),
    ("ASP", r"(?i)On\s+Error\s+Resume\s+Next"),
    ("ASP", r#"(?i)Server\.CreateObject\s*\(\s*"[a-z0-9.]+"\s*\)"#),
    ("ASP", r#"(?i)Request\.QueryString\s*\(\s*"[a-z0-9]+"\s*\)"#),
    ("ASP", r"(?i)If\s*\(\s*Err\.Number\s*.+\)\s*Then"),
    ("ASP", r#"(?i)<%@\s+LANGUAGE\s*=\s*"VBSCRIPT"\s*%>"#),
    ("ASP.NET", r"<%@\s+Page.*?%>"),
    ("ASP.NET", r#"<script\s+runat\s*=\s*""#),
    (
        "ASP.NET",
        r"<%(?:Assembly|Control|Implements|MasterType|Master|Page|OutputCache|PreviousPageType|Reference|Register).+?%>",
    ),
    ("ASP.NET", r#"@RenderPage\s*\(\s*".*?"\)"#),
    ("ASP.NET", r"@RenderBody\s*\(\s*\)"),
    ("ASP.NET", r#"@RenderSection\s*\(\s*".+?"\s*\)"#),
    ("ASP.NET", r#"Request\s*\[".+?"\]"#),
    ("ASP.NET", r"@foreach\s*"),
    ("ASP.NET", r#"Database\.Open\s*\(\s*""#),
    ("ASP.NET", r#"db\.Query\s*\(\s*""#),
    ("ASP.NET", r"@switch\s*\(.+?\)\s*\{"),
    ("ASP.NET", r"(?m)^\s*<asp:(?:Menu|TreeView|SiteMapPath)"),
    ("C#", r#"^<%@\s+Page\s+Language\s*=\s*"C#""#),
    ("C#", r"(?m)^using\s+System\s*;"),
    ("C#", r"(?mi)^namespace\s+[a-z.]+\s*\{"),
    ("C#", r"(?mi)^static\s+void\s+Main\s*\(\s*string\s*\[\s*\]\s*[a-z0-9]+\s*\)"),
    ("C#", r"@for\s*\(\s*var\s+"),
    ("C#", r"@foreach\s*\(\s*var\s+"),
    ("VB.NET", r"(?m)^Imports\s+System[a-zA-Z0-9.]*\s*$"),
    ("VB.NET", r"(?mi)^dim\s+[a-z0-9]+\s*="),
    ("VB.NET", r"(?i)@for\s+[a-z0-9]+\s*=\s*[0-9]+\s+to\s+[0-9]+"),
    ("VB.NET", r"(?i)@for\s+each\s+[a-z0-9]+\s+in\s+[a-z0-9]+"),
    ("VB.NET", r"(?i)@Select\s+Case"),
    ("C", r"#include\s+<[a-zA-Z0-9/]+\.h>"),
    ("C", r"(?m)#define\s+.+?$"),
    ("C", r"#ifndef\s+.+"),
    ("C", r"(?m)#endif\s*$"),
    ("Perl", r"(?m)^#!/usr/bin/perl"),
    ("Perl", r"(?m)^use\s+strict\s*;\s*$"),
    ("Perl", r"(?mi)^\s*my\s+\$[a-z0-9]+"),
    ("Perl", r#"die\s+".*?\$!.*?""#),
    ("Python", r"(?m)#!/usr/bin/python.*$"),
    ("Python", r"#!/usr/bin/env\s+python"),
    ("Python", r"(?mi)^\s*def\s+[a-z0-9]+\s*\(\s*[a-z0-9]+\s*\)\s*:"),
    ("Python", r"(?i)\s*for\s+[a-z0-9]+\s+in\s+[a-z0-9]+:"),
    ("Python", r"(?m)^\s*try\s*:"),
    ("Python", r"(?m)^\s*except\s*:"),
    ("Ruby", r#"(?m)^\s*require\s+".+?"\s*$"#),
    ("Ruby", r"(?mi)^\s*describe\s+[a-z0-9:]+\s+do"),
    ("Ruby", r"(?mi)^\s*class\s+[a-z0-9]+\s+<\s*[a-z0-9:]+"),
    ("Ruby", r"(?msi)^\s*def\s+[a-z0-9]+\s*.+?^\s*end\s*$"),
    ("Ruby", r"(?i)@@active\s*=\s*"),
    ("Cold Fusion", r"<cf(?:output|set|execute|exit|component|function|return|argument|script|loop|queryparam|query|dump|if|elseif|else)"),
    ("Cold Fusion", r"writeOutput\s*\("),
    ("ActiveVFP", r#"(?msi)oRequest\.querystring\s*\(\s*"[a-z0-9]+"\s*\)"#),
    ("ActiveVFP", r"(?msi)define\s+class\s+[a-z0-9]+\s+as\s+[a-z0-9]+"),
    ("ActiveVFP", r"(?i)for\s+[a-z0-9]+\s*=\s*[0-9]+\s+to\s+[0-9]+.+?\s+endfor"),
    ("ActiveVFP", r"(?msi)do\s+while\s+.+?\s+enddo"),
    ("ActiveVFP", r"(?msi)do\s+case\s+case\s+.+?\s+endcase"),
    ("ActiveVFP", r"(?msi)for\s+each\s+.+?\s+endfor"),
    ("Pascal", r"(?msi)^program\s+[a-z0-9]+;.*?begin.+?end"),
    ("LaTeX", r"(?mi)\\documentclass\s*\{[a-z]+\}"),
    ("LaTeX", r"(?mi)\\begin\s*\{[a-z]+\}"),
    ("ActionScript 3.0", r"(?msi)package\s+[a-z0-9.]+\s*\{(?:.*import\s+[a-z0-9.]+\s*;)?.+\}"),
];

fn language_regexes() -> &'static [(&'static str, Regex)] {
    static RES: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    RES.get_or_init(|| {
        LANGUAGE_PATTERNS
            .iter()
            .map(|(lang, pattern)| (*lang, Regex::new(pattern).expect("Invalid source code regex")))
            .collect()
    })
}

/// The language and text of the first source code signature in `body`
fn detect(body: &str) -> Option<(&'static str, &str)> {
    language_regexes().iter().find_map(|(lang, re)| {
        re.find(body)
            .map(|m| m.as_str())
            .filter(|evidence| !evidence.is_empty())
            .map(|evidence| (*lang, evidence))
    })
}

/// Reports application source code leaked in responses
pub struct SourceCodeDisclosureRule;

impl SourceCodeDisclosureRule {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SourceCodeDisclosureRule {
    fn default() -> Self {
        Self::new()
    }
}

impl PassiveRule for SourceCodeDisclosureRule {
    fn plugin_id(&self) -> u32 {
        10099
    }

    fn name(&self) -> &str {
        "Source Code Disclosure"
    }

    fn scan(&self, msg: &HttpMessage, _threshold: AlertThreshold) -> Vec<Finding> {
        let body = msg.response.body_text();
        let Some((lang, evidence)) = detect(&body) else {
            return Vec::new();
        };
        tracing::debug!(lang, evidence, "Source code signature matched");

        vec![Finding::new(
            self.plugin_id(),
            &format!("{} - {}", self.name(), lang),
            Severity::Medium,
            msg.url(),
        )
        .with_confidence(Confidence::Medium)
        .with_description(&format!(
            "Application Source Code was disclosed by the web server - {}",
            lang
        ))
        .with_evidence(evidence)
        .with_other_info(evidence)
        .with_remediation("Ensure that application Source Code is not available with alternative extensions, and ensure that source code is not present within other files or data deployed to the web server, or served by the web server.")
        .with_reference("https://cwe.mitre.org/data/definitions/540.html")
        .with_cwe(540)
        .with_wasc(13)
        .with_scanner("passive/source-code")]
    }
}
