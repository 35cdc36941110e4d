// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Tool and prompt normalization.
//!
//! Turns a server's raw capability advertisement into a deterministic,
//! order-stable shape: tools sorted by name, arguments required-first and
//! alphabetical within each group, types defaulted, and argument descriptions
//! recovered from prose when the schema has none.

use std::collections::BTreeSet;

use crate::core::models::{RawPrompt, RawTool};
use crate::schema::types::{Items, Prompt, PromptArgument, Tool, ToolArgument};

/// Normalize a full `tools/list` result.
pub fn normalize_tools(raw: &[RawTool]) -> Vec<Tool> {
    let mut sorted: Vec<&RawTool> = raw.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));
    sorted.into_iter().map(normalize_tool).collect()
}

pub fn normalize_tool(raw: &RawTool) -> Tool {
    let description = raw.description.as_deref().unwrap_or_default();
    let required: BTreeSet<&str> = raw
        .input_schema
        .required
        .iter()
        .flatten()
        .map(String::as_str)
        .collect();

    let mut arguments = Vec::new();
    if let Some(properties) = &raw.input_schema.properties {
        // BTreeMap iteration is already alphabetical; partition keeps that order.
        let (mandatory, optional): (Vec<_>, Vec<_>) = properties
            .iter()
            .partition(|(name, _)| required.contains(name.as_str()));

        for (name, schema) in mandatory.into_iter().chain(optional) {
            let is_optional = !required.contains(name.as_str());
            arguments.push(ToolArgument {
                name: name.clone(),
                arg_type: schema.type_name().to_string(),
                items: schema.item_type().map(|item_type| Items {
                    item_type: item_type.to_string(),
                }),
                description: schema
                    .description
                    .clone()
                    .unwrap_or_else(|| extract_argument_description(description, name)),
                optional: is_optional,
            });
        }
    }

    Tool {
        name: raw.name.clone(),
        description: strip_args_block(description),
        arguments,
        annotations: raw
            .annotations
            .clone()
            .filter(|annotations| !annotations.is_empty()),
    }
}

/// Normalize a full `prompts/list` result.
pub fn normalize_prompts(raw: &[RawPrompt]) -> Vec<Prompt> {
    let mut prompts: Vec<Prompt> = raw
        .iter()
        .map(|prompt| {
            let mut arguments: Vec<PromptArgument> = prompt
                .arguments
                .iter()
                .flatten()
                .map(|arg| PromptArgument {
                    name: arg.name.clone(),
                    description: arg.description.clone().unwrap_or_default(),
                    optional: !arg.required.unwrap_or(false),
                })
                .collect();
            arguments.sort_by(|a, b| a.optional.cmp(&b.optional).then_with(|| a.name.cmp(&b.name)));

            Prompt {
                name: prompt.name.clone(),
                description: prompt.description.clone().unwrap_or_default(),
                arguments,
            }
        })
        .collect();
    prompts.sort_by(|a, b| a.name.cmp(&b.name));
    prompts
}

/// Drop everything from the first `Args:` line onwards.
pub fn strip_args_block(description: &str) -> String {
    description
        .lines()
        .take_while(|line| {
            !line
                .trim()
                .get(..5)
                .is_some_and(|head| head.eq_ignore_ascii_case("args:"))
        })
        .map(|line| if line.trim().is_empty() { "" } else { line })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Find a `<name>: <text>` line in a tool's prose and return `<text>`.
pub fn extract_argument_description(tool_description: &str, name: &str) -> String {
    let prefix = format!("{}:", name);
    for line in tool_description.lines() {
        let line = line.trim();
        let Some(head) = line.get(..prefix.len()) else {
            continue;
        };
        if head.eq_ignore_ascii_case(&prefix) {
            return line[prefix.len()..].trim().to_string();
        }
    }
    String::new()
}
