//! Transcript writer: renders a value plus a type descriptor into
//! line-oriented records.
//!
//! Each record is `"<name> <scope-or-fn> <counter> : <value>"`. Pointer
//! chasing, cycle breaking and the region filters all live here; the
//! dispatcher is a single switch over the field's format code.

use std::io::Write;

use tracing::warn;

use exitscope_protocol::{FormatCode, RuntimeMode, TypeDescriptor};

use crate::fingerprint;
use crate::heap_table::{HeapData, HeapTable};
use crate::memory::Memory;
use crate::RuntimeError;

/// One reporting pass over the program state. Borrows the session's type
/// table and heap table for the duration of a single entry-point call.
pub struct Reporter<'a> {
    pub types: &'a [TypeDescriptor],
    pub heap: &'a mut HeapTable,
    pub mode: RuntimeMode,
    pub mem: &'a dyn Memory,
    pub out: &'a mut dyn Write,
}

impl<'a> Reporter<'a> {
    fn type_name(&self, index: i32) -> &str {
        self.types
            .get(index as usize)
            .map(|t| t.name.as_str())
            .unwrap_or("unknown")
    }

    /// Walk every field of the descriptor at `type_index`, rendering the
    /// data at `addr`.
    pub fn inspect_data(
        &mut self,
        addr: u64,
        type_index: i32,
        name: &str,
        fn_name: &str,
        counter: i32,
    ) -> Result<(), RuntimeError> {
        let descriptor = match self.types.get(type_index as usize) {
            Some(d) => d.clone(),
            None => {
                warn!(type_index, name, "type index out of range, skipping");
                return Ok(());
            }
        };
        for field in &descriptor.fields {
            let full_name = if field.name.is_empty() {
                name.to_string()
            } else {
                format!("{name}-{}", field.name)
            };
            let field_addr = addr.wrapping_add(field.offset as u64);
            match field.format {
                f if FormatCode::is_scalar(f) || f == 14 => {
                    self.print_scalar(field_addr, f, &full_name, fn_name, counter)?;
                }
                13 => {
                    if self.mode.precise {
                        let target = self.mem.read_ptr(field_addr).unwrap_or(0);
                        self.track_pointer(
                            target,
                            field.base_type_index,
                            &full_name,
                            fn_name,
                            counter,
                        )?;
                    } else {
                        let pointee = self.type_name(field.base_type_index).to_string();
                        writeln!(
                            self.out,
                            "{name} {fn_name} {counter} : pointer to {pointee}"
                        )?;
                    }
                }
                15 => {
                    let element = match self.types.get(field.base_type_index as usize) {
                        Some(d) if !d.fields.is_empty() => d.fields[0].clone(),
                        _ => {
                            warn!(
                                base = field.base_type_index,
                                "array field without element descriptor"
                            );
                            continue;
                        }
                    };
                    let hash = fingerprint::hashcode(
                        self.mem,
                        field_addr,
                        element.offset as i64,
                        element.offset as i64,
                        element.format,
                    );
                    writeln!(self.out, "{full_name} {fn_name} {counter} : {hash}")?;
                }
                16 => {
                    self.inspect_union(addr, field.offset as u64, name, fn_name, counter)?;
                }
                17 => {
                    self.inspect_data(field_addr, field.base_type_index, name, fn_name, counter)?;
                }
                18 => {
                    writeln!(
                        self.out,
                        "{full_name} {fn_name} {counter} : non-inspectable value"
                    )?;
                }
                other => {
                    warn!(format = other, name = %full_name, "unknown format while inspecting data");
                }
            }
        }
        Ok(())
    }

    /// Pointer entry point: chase in precise mode, name the pointee type in
    /// fast mode. After a precise traversal every visited bit is cleared so
    /// the next top-level chase starts fresh.
    pub fn inspect_pointer(
        &mut self,
        ptr: u64,
        type_index: i32,
        name: &str,
        fn_name: &str,
        counter: i32,
    ) -> Result<(), RuntimeError> {
        if self.mode.precise {
            self.track_pointer(ptr, type_index, name, fn_name, counter)?;
            self.heap.clear_visited();
        } else {
            let pointee = self.type_name(type_index).to_string();
            writeln!(self.out, "{name} {fn_name} {counter} : pointer to {pointee}")?;
        }
        Ok(())
    }

    fn track_pointer(
        &mut self,
        ptr: u64,
        type_index: i32,
        name: &str,
        fn_name: &str,
        counter: i32,
    ) -> Result<(), RuntimeError> {
        if self.heap.contains(ptr) {
            if self.mode.mem_filter() && !self.mode.inspect_heap {
                return Ok(());
            }
            self.inspect_heap_entry(ptr, name, fn_name, counter, true)?;
        } else if ptr != 0 {
            if self.mode.mem_filter() && !self.mode.inspect_stack {
                return Ok(());
            }
            // A non-null address the heap table does not know is assumed to
            // point into static or stack storage. Addresses below the text
            // boundary are wild; following one would fault.
            if ptr < self.mem.etext() {
                return Ok(());
            }
            self.inspect_data(ptr, type_index, name, fn_name, counter)?;
        } else {
            writeln!(self.out, "{name} {fn_name} {counter} : NULL")?;
        }
        Ok(())
    }

    /// Report one heap entry, honoring the visited and freed marks.
    pub fn inspect_heap_entry(
        &mut self,
        block: u64,
        name: &str,
        fn_name: &str,
        counter: i32,
        _follow: bool,
    ) -> Result<(), RuntimeError> {
        if self.heap.set_visited(block) {
            return Ok(());
        }
        let entry = match self.heap.get(block) {
            Some(entry) => entry,
            None => return Ok(()),
        };
        if entry.freed {
            writeln!(self.out, "{name} {fn_name} {counter} : freed")?;
            return Ok(());
        }
        let data = match entry.data {
            Some(data) => data,
            None => return Ok(()),
        };
        if data.count > 1 {
            self.inspect_heap_array(block, data, name, fn_name, counter)
        } else {
            self.inspect_data(block, data.type_index, name, fn_name, counter)
        }
    }

    fn inspect_heap_array(
        &mut self,
        block: u64,
        data: HeapData,
        name: &str,
        fn_name: &str,
        counter: i32,
    ) -> Result<(), RuntimeError> {
        let element = match self
            .types
            .get(data.type_index as usize)
            .and_then(|d| d.fields.first())
        {
            Some(f) => f.clone(),
            None => {
                warn!(type_index = data.type_index, "heap entry without descriptor");
                return Ok(());
            }
        };
        if FormatCode::is_scalar(element.format) {
            let hash =
                fingerprint::hashcode(self.mem, block, data.count, data.stride, element.format);
            // Historical record shape: no space before the colon here.
            writeln!(self.out, "{name} {fn_name} {counter}: {hash}")?;
        } else if element.format == 13 {
            for i in 0..data.count {
                let slot = block.wrapping_add(i as u64 * 8);
                let target = self.mem.read_ptr(slot).unwrap_or(0);
                let slot_name = format!("{name}[{i}]");
                self.track_pointer(target, element.base_type_index, &slot_name, fn_name, counter)?;
            }
        } else {
            warn!(
                format = element.format,
                name, "heap array of non-scalar elements is not inspected"
            );
        }
        Ok(())
    }

    /// Report every live heap entry under the synthetic name `Heap Data`,
    /// then reset the visited marks.
    pub fn inspect_entire_heap(&mut self, fn_name: &str, counter: i32) -> Result<(), RuntimeError> {
        for block in self.heap.addresses() {
            let freed = self.heap.get(block).map(|e| e.freed).unwrap_or(true);
            if !freed {
                self.inspect_heap_entry(block, "Heap Data", fn_name, counter, false)?;
            }
        }
        self.heap.clear_visited();
        Ok(())
    }

    /// Byte-wise decimal dump of a union's storage.
    pub fn inspect_union(
        &mut self,
        addr: u64,
        size: u64,
        name: &str,
        fn_name: &str,
        counter: i32,
    ) -> Result<(), RuntimeError> {
        write!(self.out, "{name} {fn_name} {counter} : ")?;
        for i in 0..size {
            let byte = self.mem.read_i8(addr + i).unwrap_or(0);
            write!(self.out, "{byte}")?;
        }
        writeln!(self.out)?;
        Ok(())
    }

    fn print_scalar(
        &mut self,
        addr: u64,
        format: i32,
        name: &str,
        fn_name: &str,
        counter: i32,
    ) -> Result<(), RuntimeError> {
        let rendered = match render_scalar(self.mem, addr, format) {
            Some(text) => text,
            None => {
                warn!(addr, format, name, "unreadable scalar, skipping");
                return Ok(());
            }
        };
        writeln!(self.out, "{name} {fn_name} {counter} : {rendered}")?;
        Ok(())
    }
}

fn printable(byte: u8) -> bool {
    (0x20..=0x7e).contains(&byte)
}

/// Render one scalar according to its format code.
pub fn render_scalar(mem: &dyn Memory, addr: u64, format: i32) -> Option<String> {
    Some(match format {
        1 => format!("{:.2}", mem.read_f64(addr)?),
        2 => format!("{:.2}", mem.read_f32(addr)? as f64),
        3 => mem.read_i16(addr)?.to_string(),
        4 | 5 => mem.read_i64(addr)?.to_string(),
        6 => mem.read_i32(addr)?.to_string(),
        7 => {
            let byte = mem.read_u8(addr)?;
            if printable(byte) {
                (byte as char).to_string()
            } else {
                "@".to_string()
            }
        }
        8 => {
            let byte = mem.read_u8(addr)?;
            if printable(byte) {
                byte.to_string()
            } else {
                "@".to_string()
            }
        }
        9 => mem.read_u16(addr)?.to_string(),
        10 | 11 => mem.read_u64(addr)?.to_string(),
        12 => mem.read_u32(addr)?.to_string(),
        14 => "void".to_string(),
        _ => return None,
    })
}
