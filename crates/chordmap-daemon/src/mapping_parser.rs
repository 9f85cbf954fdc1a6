//! Building the handler graph of a preset
//!
//! Every valid mapping of a preset becomes a small tree of handlers:
//!
//! 1. The output handler ([`create_output_handler`]) is wrapped with whatever
//!    it asks for in [`MappingHandler::wrap_with`], recursively. Each wrapper
//!    claims its events from the handler it wraps.
//! 2. Handlers that compete for the same event are put under one
//!    [`HierarchyHandler`], longest combination first.
//! 3. The hierarchies and the handlers that were ranked are wrapped like in
//!    step 1, which turns axis triggers into buttons.
//!
//! The handlers that still watch events directly after this are the entry
//! points of the graph. [`HandlerGraph`] routes events to them by type and
//! code.

use std::collections::HashMap;
use std::sync::Arc;

use chordmap_config::{InputEvent, Mapping, Preset};

use crate::device::DeviceInfo;
use crate::error::MappingParsingError;
use crate::injector::OutputSink;
use crate::mapping_handlers::{
    create_handler, create_output_handler, handler_ref, Context, HandlerRef, HierarchyHandler,
    InputEventHandler, MappingHandler,
};

/// Entry points of a preset's handlers, by the type and code they watch.
#[derive(Default)]
pub struct HandlerGraph {
    routes: HashMap<(u16, u16), Vec<HandlerRef>>,
    handlers: Vec<HandlerRef>,
}

impl HandlerGraph {
    fn from_entry_points(handlers: Vec<HandlerRef>) -> Self {
        let mut routes: HashMap<(u16, u16), Vec<HandlerRef>> = HashMap::new();
        for handler in &handlers {
            let watched: Vec<InputEvent> = handler.lock().input_events().to_vec();
            for event in watched {
                let entry = routes.entry(event.type_and_code()).or_default();
                if !entry.iter().any(|known| Arc::ptr_eq(known, handler)) {
                    entry.push(handler.clone());
                }
            }
        }
        Self { routes, handlers }
    }

    pub fn handlers(&self) -> &[HandlerRef] {
        &self.handlers
    }

    pub fn handlers_for(&self, type_and_code: (u16, u16)) -> &[HandlerRef] {
        self.routes
            .get(&type_and_code)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Pass an event to every handler watching its type and code. Returns
    /// whether any of them consumed it.
    pub fn notify(&self, event: InputEvent, source: &DeviceInfo, forward: &OutputSink) -> bool {
        let mut handled = false;
        for handler in self.handlers_for(event.type_and_code()) {
            if handler.lock().notify(event, source, forward, false) {
                handled = true;
            }
        }
        handled
    }

    pub fn reset(&self) {
        for handler in &self.handlers {
            handler.lock().reset();
        }
    }
}

/// Build the handler graph for all valid mappings of `preset`.
///
/// Invalid mappings are logged and skipped. Errors are bugs in how handlers
/// declare their wrapping and abort the whole build.
pub fn parse_mappings(
    preset: &Preset,
    context: &Context,
) -> Result<HandlerGraph, MappingParsingError> {
    let mut mappings: Vec<Arc<Mapping>> = Vec::new();
    for mapping in preset.iter() {
        match mapping.validate() {
            Ok(()) => mappings.push(Arc::new(mapping.clone())),
            Err(e) => tracing::warn!("Skipping mapping: {}", e),
        }
    }
    // stable handler order regardless of how the preset stores its mappings
    mappings.sort_by_key(|mapping| mapping.event_combination().json_str());

    let mut handlers = Vec::new();
    for mapping in mappings {
        let output = match create_output_handler(mapping.clone(), context) {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(
                    "Skipping mapping {}: {}",
                    mapping.event_combination(),
                    e
                );
                continue;
            }
        };
        handlers.extend(create_event_pipeline(output, context, false)?);
    }

    let (ranked, mut entry_points): (Vec<HandlerRef>, Vec<HandlerRef>) = handlers
        .into_iter()
        .partition(|handler| handler.lock().needs_ranking());

    for handler in create_hierarchy_handlers(ranked)? {
        entry_points.extend(create_event_pipeline(handler, context, true)?);
    }

    let mut unique: Vec<HandlerRef> = Vec::new();
    for handler in entry_points {
        if !unique.iter().any(|known| Arc::ptr_eq(known, &handler)) {
            unique.push(handler);
        }
    }

    tracing::debug!("Built handler graph with {} entry points", unique.len());
    for handler in &unique {
        tracing::debug!("  {}", handler.lock().describe());
    }
    Ok(HandlerGraph::from_entry_points(unique))
}

/// Wrap `handler` as it requests and return the handlers that still watch
/// events directly. A handler that needs ranking is returned unwrapped
/// unless `ignore_ranking` is set.
pub fn create_event_pipeline(
    handler: HandlerRef,
    context: &Context,
    ignore_ranking: bool,
) -> Result<Vec<HandlerRef>, MappingParsingError> {
    let (needs_ranking, wrap_with, mapping) = {
        let guard = handler.lock();
        (
            guard.needs_ranking(),
            guard.wrap_with(),
            guard.base().mapping.clone(),
        )
    };

    if (needs_ranking && !ignore_ranking) || wrap_with.is_empty() {
        return Ok(vec![handler]);
    }

    let mut entry_points = Vec::new();
    for (combination, kind) in wrap_with {
        let wrapper = create_handler(kind, &combination, mapping.clone(), context)?;
        wrapper.lock().set_sub_handler(handler.clone());
        {
            let mut guard = handler.lock();
            for event in combination.iter() {
                guard.occlude_input_event(event)?;
            }
        }
        entry_points.extend(create_event_pipeline(wrapper, context, false)?);
    }

    if !handler.lock().input_events().is_empty() {
        entry_points.push(handler);
    }
    Ok(entry_points)
}

/// Rank handlers that compete for the same events.
///
/// Returns the new hierarchy handlers plus every ranked handler that still
/// watches events of its own.
fn create_hierarchy_handlers(
    handlers: Vec<HandlerRef>,
) -> Result<Vec<HandlerRef>, MappingParsingError> {
    let mut competitors: Vec<(InputEvent, Vec<HandlerRef>)> = Vec::new();
    for handler in &handlers {
        let rank_by = {
            let guard = handler.lock();
            guard
                .rank_by()
                .ok_or_else(|| MappingParsingError::NothingToRank {
                    handler: guard.describe(),
                })?
        };
        for event in rank_by.iter() {
            match competitors.iter_mut().find(|(known, _)| known == event) {
                Some((_, group)) => group.push(handler.clone()),
                None => competitors.push((*event, vec![handler.clone()])),
            }
        }
    }

    let mut shadowed: Vec<(HandlerRef, Vec<HandlerRef>)> = Vec::new();
    let mut result = Vec::new();

    for (event, mut group) in competitors {
        if group.len() == 1 {
            continue;
        }

        group.sort_by_cached_key(|handler| {
            let guard = handler.lock();
            let combination = guard.mapping().event_combination();
            (std::cmp::Reverse(combination.len()), combination.json_str())
        });

        let lengths: Vec<usize> = group
            .iter()
            .map(|handler| handler.lock().mapping().event_combination().len())
            .collect();
        for (index, handler) in group.iter().enumerate() {
            handler.lock().occlude_input_event(&event)?;

            let shorter: Vec<HandlerRef> = group
                .iter()
                .zip(&lengths)
                .skip(index + 1)
                .filter(|(_, length)| **length < lengths[index])
                .map(|(other, _)| other.clone())
                .collect();
            match shadowed.iter_mut().find(|(known, _)| Arc::ptr_eq(known, handler)) {
                Some((_, list)) => {
                    for other in shorter {
                        if !list.iter().any(|known| Arc::ptr_eq(known, &other)) {
                            list.push(other);
                        }
                    }
                }
                None => shadowed.push((handler.clone(), shorter)),
            }
        }

        let mapping = group[0].lock().base().mapping.clone();
        tracing::debug!("Ranking {} handlers on {}", group.len(), event);
        result.push(handler_ref(HierarchyHandler::new(group, event, mapping)));
    }

    for (handler, list) in shadowed {
        if !list.is_empty() {
            handler.lock().set_shadowed(list);
        }
    }

    for handler in handlers {
        if !handler.lock().input_events().is_empty()
            && !result.iter().any(|known| Arc::ptr_eq(known, &handler))
        {
            result.push(handler);
        }
    }
    Ok(result)
}
