//! The kernel's orchestration point: owns the event queue, the global
//! allocator, and the bring-up/main-loop sequence `main.rs`'s
//! `kernel_entry` hands off to (spec.md 4.1 "Boot sequence", 6
//! "Multiboot entry").
//!
//! Grounded in the teacher's `crates/kernel/src/main.rs` idle-loop shape
//! (serial-driven keyboard/timer demo feeding one `kprintln!` sink) and
//! `original_source/pozitron_os/src/kernel/main.c`'s ordered bring-up
//! (CPU tables, then PIC/PIT, then drivers, then the shell/GUI loop).
//! Unlike the teacher this has exactly one consumer of the event queue
//! (the GUI event router) and exactly one render target (VESA), so there
//! is no scheduler here -- just a single `hlt`-idle loop.

use core::alloc::{GlobalAlloc, Layout};

use alloc::string::String;
use spin::Mutex;

use crate::arch::port::without_interrupts;
use crate::config::BootConfig;
use crate::display::Rect;
use crate::event::{Event, EventKind, EventQueue, DEFAULT_CAPACITY};
use crate::gui::{EventRouter, RouterCommand, ShutdownController, ShutdownEvent, WindowCaps, WindowManager};
use crate::heap::Heap;
use crate::{klog_error, klog_info, klog_warn};

/// The heap backing every `alloc::*` allocation in the kernel, including
/// the global allocator below. Sized and placed by `select_heap_region`
/// once the memory map is known (spec.md 4.5).
static HEAP: Heap = Heap::uninitialized();

/// Adapts [`Heap`]'s size+alignment API to [`GlobalAlloc`]. `Heap`
/// already tracks an aligned "raw pointer before the payload" scheme in
/// `malloc_aligned`/`free_aligned`; this just forwards `Layout`'s two
/// fields to whichever of the pair the requested alignment needs.
struct KernelAllocator;

unsafe impl GlobalAlloc for KernelAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if layout.align() <= crate::heap::ALIGNMENT {
            HEAP.malloc(layout.size())
        } else {
            HEAP.malloc_aligned(layout.size(), layout.align())
        }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        if layout.align() <= crate::heap::ALIGNMENT {
            HEAP.free(ptr);
        } else {
            HEAP.free_aligned(ptr);
        }
    }
}

#[global_allocator]
static ALLOCATOR: KernelAllocator = KernelAllocator;

#[alloc_error_handler]
fn alloc_error(layout: Layout) -> ! {
    klog_error!("allocation failure: size={} align={}", layout.size(), layout.align());
    crate::arch::cpu::halt_loop()
}

/// The single producer/consumer event ring (spec.md 3 "Event queue").
/// ISR handlers post through [`post_event`] with interrupts already
/// masked by the calling stub; the main loop below is the sole consumer.
static EVENT_QUEUE: Mutex<EventQueue<DEFAULT_CAPACITY>> = Mutex::new(EventQueue::new());

/// The same heap [`KernelAllocator`] draws from, exposed so
/// `drivers::usb_hc`'s controller variants can allocate aligned,
/// identity-mapped DMA descriptor memory directly (spec.md 4.6
/// "allocate aligned descriptor memory from the heap") rather than going
/// through the `GlobalAlloc`/`Layout` indirection for a raw pointer they
/// immediately hand to hardware.
pub fn heap() -> &'static Heap {
    &HEAP
}

/// Called by `drivers::ps2`'s keyboard/mouse IRQ handlers (and, on the
/// real target, the USB HID poll routine) to hand a decoded event to the
/// main loop.
pub fn post_event(event: Event) {
    without_interrupts(|| EVENT_QUEUE.lock().post(event));
}

fn poll_event() -> Option<Event> {
    let mut out = Event::NONE;
    let got = without_interrupts(|| EVENT_QUEUE.lock().poll(&mut out));
    if got {
        Some(out)
    } else {
        None
    }
}

const DEFAULT_SCREEN_W: u32 = 1024;
const DEFAULT_SCREEN_H: u32 = 768;

/// Finds every PCI function classified as a USB host controller (class
/// 0x0C, subclass 0x03) and brings each one up far enough to confirm its
/// register file answers and its root ports can be powered and reset
/// (spec.md 4.6 "HC init", "power and reset each root port").
///
/// Controllers are probed rather than kept resident: each one is built,
/// logged, and dropped (freeing its descriptor memory) before moving to
/// the next. Persisting a live controller plus its enumerated devices
/// across main-loop iterations, the way `drivers::ps2` keeps its
/// decoders in a `static`, is future work — see `DESIGN.md`.
///
/// # Safety
/// Must only run after `crate::drivers::pci::scan` and the heap are both
/// initialized, and before anything else touches these controllers' BARs.
unsafe fn bring_up_usb_controllers(inventory: &crate::pci::HardwareInventory) {
    use crate::drivers::usb_hc::{ehci::EhciController, ohci::OhciController, uhci::UhciController};
    use crate::usb::ControllerKind;

    for function in inventory.by_class(0x0C, 0x03) {
        let Some(kind) = ControllerKind::from_prog_if(function.prog_if) else {
            continue;
        };
        match kind {
            ControllerKind::Uhci => {
                let io_base = (function.bars[4] & 0xFFFC) as u16;
                match unsafe { UhciController::init(io_base) } {
                    Ok(ctrl) => {
                        klog_info!("uhci controller up at io={:#06x}", io_base);
                        match ctrl.reset_port(0) {
                            Ok(speed) => klog_info!("uhci port0 ready, speed={:?}", speed),
                            Err(e) => klog_warn!("uhci port0 not ready: {:?}", e),
                        }
                    }
                    Err(e) => klog_warn!("uhci init failed at io={:#06x}: {:?}", io_base, e),
                }
            }
            ControllerKind::Ohci => {
                let mmio_base = function.bars[0] & 0xFFFF_FFF0;
                match unsafe { OhciController::init(mmio_base) } {
                    Ok(ctrl) => {
                        klog_info!("ohci controller up at mmio={:#010x}", mmio_base);
                        match ctrl.reset_port(0) {
                            Ok(speed) => klog_info!("ohci port0 ready, speed={:?}", speed),
                            Err(e) => klog_warn!("ohci port0 not ready: {:?}", e),
                        }
                    }
                    Err(e) => klog_warn!("ohci init failed at mmio={:#010x}: {:?}", mmio_base, e),
                }
            }
            ControllerKind::Ehci => {
                let mmio_base = function.bars[0] & 0xFFFF_FFF0;
                match unsafe { EhciController::init(mmio_base) } {
                    Ok(ctrl) => {
                        klog_info!("ehci controller up at mmio={:#010x}", mmio_base);
                        match ctrl.reset_port(0) {
                            Ok(speed) => klog_info!("ehci port0 ready, speed={:?}", speed),
                            Err(e) => klog_warn!("ehci port0 not ready: {:?}", e),
                        }
                    }
                    Err(e) => klog_warn!("ehci init failed at mmio={:#010x}: {:?}", mmio_base, e),
                }
            }
            ControllerKind::Xhci => {
                klog_warn!("xhci controller present but unsupported (spec scope: UHCI/OHCI/EHCI only)");
            }
        }
    }
}

fn timer_irq_handler(_vector: u8, _error_code: u32) {
    let fire = crate::arch::pit::tick();
    let ticks = crate::arch::pit::ticks();
    without_interrupts(|| EVENT_QUEUE.lock().set_ticks(ticks));
    if fire {
        post_event(Event::new(EventKind::TimerTick, 0, 0));
    }
}

/// Builds the desktop's base window: full-screen, no title bar, sitting
/// under everything else. There are no bundled applications in this
/// kernel's scope (spec.md 1 "Out of scope"), so it is the only window
/// created at boot.
fn build_desktop(wm: &mut WindowManager, screen_w: u32, screen_h: u32) {
    let desktop_caps = WindowCaps::empty();
    if let Some(id) = wm.create_window(String::from("Desktop"), Rect::new(0, 0, screen_w, screen_h), desktop_caps) {
        klog_info!("desktop window created id={}", id);
    }
}

/// Runs the framebuffer compositor's fixed five-stage pipeline once per
/// frame (spec.md 4.7 "Compositor pipeline"): restore whatever the
/// cursor was drawn over, repaint every visible window back-to-front,
/// repaint the taskbar, draw the cursor back at its current position,
/// and present the dirty rects.
fn render_frame(
    vesa: &mut crate::drivers::vesa::Vesa,
    wm: &WindowManager,
    shutdown: &ShutdownController,
    cursor: (i32, i32),
) {
    vesa.restore_cursor_background();

    for window in wm.windows_back_to_front() {
        if !window.visible {
            continue;
        }
        vesa.mark_dirty(window.geometry);
        vesa.fill_rect(window.geometry, 0x002D_2D30);
        if window.caps.contains(WindowCaps::HAS_TITLE) {
            vesa.fill_rect(window.title_bar_rect(), 0x0040_4044);
            vesa.draw_text(window.geometry.x + 4, window.geometry.y + 4, &window.title, 0x00FF_FFFF, None);
        }
    }

    vesa.fill_rect(wm.taskbar.strip_rect(), 0x001E_1E1E);
    for (slot, button) in wm.taskbar.visible_buttons() {
        let rect = wm.taskbar.button_rect(slot);
        vesa.draw_text(rect.x + 4, rect.y + 4, &button.label, 0x00CC_CCCC, None);
    }

    if shutdown.is_modal() {
        if let Some(dialog_id) = shutdown.dialog_window() {
            if let Some(window) = wm.window(dialog_id) {
                vesa.fill_rect(window.geometry, 0x0030_3030);
                vesa.draw_text(window.geometry.x + 8, window.geometry.y + 8, "Shut down now?", 0x00FF_FFFF, None);
            }
        }
    }

    vesa.draw_cursor(cursor.0, cursor.1, 0x00FF_FFFF);
    vesa.present();
}

/// Main orchestration entry point, called from `main.rs`'s
/// `kernel_entry` once paging-free protected mode is all this kernel
/// assumes it will ever get (spec.md 1 Non-goals). Never returns.
///
/// # Safety
/// Must be called exactly once, with `magic`/`info_ptr` the untouched
/// values the Multiboot loader handed `_start`, before any other part of
/// this crate has touched hardware.
pub unsafe fn run(magic: u32, info_ptr: u32) -> ! {
    unsafe { crate::arch::serial::init() };
    klog_info!("lumen kernel starting");

    let info_buf = unsafe { core::slice::from_raw_parts(info_ptr as *const u8, 8192) };
    let mut boot_info = match crate::multiboot::parse(magic, info_buf) {
        Some(info) => info,
        None => {
            klog_error!("unrecognized multiboot magic={:#010x}", magic);
            crate::multiboot::BootInfo::default()
        }
    };
    if magic == 0x1BADB002 {
        unsafe { crate::arch::boot::resolve_v1_tables(&mut boot_info, info_ptr) };
    }

    let config = BootConfig::from_boot_info(&boot_info);
    crate::logging::set_level(config.log_level);
    klog_info!(
        "boot config: log={} pit_hz={} headless={}",
        config.log_level.as_str(),
        config.pit_hz,
        config.headless
    );

    // Kernel image occupies [1 MiB, kernel_end); linker.ld places
    // everything after that and exports `__kernel_end` the same way it
    // marks `__bss_start`/`__bss_end`.
    extern "C" {
        static __kernel_end: u8;
    }
    let kernel_end = unsafe { core::ptr::addr_of!(__kernel_end) } as u64;

    let candidate = crate::memmap::select_heap_region(&boot_info.memory_map, (0x0010_0000, kernel_end), &[])
        .or_else(|| {
            let available_after = boot_info.mem_upper_kb as u64 * 1024;
            crate::memmap::fallback_candidate(kernel_end, available_after, &[])
        });

    match candidate {
        Some(region) => {
            unsafe { HEAP.init(region.base as usize, region.size as usize) };
            klog_info!("heap initialized base={:#010x} size={}", region.base, region.size);
        }
        None => {
            klog_error!("no usable heap region found, halting");
            crate::arch::cpu::halt_loop();
        }
    }

    unsafe {
        crate::arch::gdt::init(crate::arch::boot::stack_top());
        crate::arch::idt::init();
        crate::arch::pic::init();
        crate::arch::pit::init(config.pit_hz);
    }
    crate::arch::interrupts::install_handler(crate::idt::irq_to_vector(0), timer_irq_handler);

    let (screen_w, screen_h) = boot_info
        .framebuffer
        .as_ref()
        .filter(|fb| fb.valid)
        .map(|fb| (fb.width, fb.height))
        .unwrap_or((DEFAULT_SCREEN_W, DEFAULT_SCREEN_H));

    unsafe { crate::drivers::ps2::init(screen_w as i32, screen_h as i32) };
    crate::arch::cpu::enable_interrupts();

    let mut wm = WindowManager::new(screen_w, screen_h);
    build_desktop(&mut wm, screen_w, screen_h);
    let mut router = EventRouter::new();
    let mut shutdown = ShutdownController::new();
    let mut cursor = (screen_w as i32 / 2, screen_h as i32 / 2);

    let mut vesa = if config.headless {
        None
    } else {
        match boot_info.framebuffer.as_ref().filter(|fb| fb.valid) {
            Some(fb) => match unsafe { crate::drivers::vesa::Vesa::init(fb) } {
                Ok(v) => Some(v),
                Err(e) => {
                    klog_warn!("vesa init failed: {}", e);
                    None
                }
            },
            None => {
                klog_warn!("no framebuffer tag present, running headless");
                None
            }
        }
    };

    if !config.headless {
        let inventory = crate::drivers::pci::scan();
        klog_info!("pci scan complete: {} functions", inventory.pci_functions.len());
        for (a, b) in inventory.io_port_conflicts() {
            klog_warn!("io port conflict between {:?} and {:?}", a, b);
        }
        unsafe { bring_up_usb_controllers(&inventory) };
    }

    klog_info!("entering main loop");
    loop {
        while let Some(event) = poll_event() {
            if event.kind == EventKind::MouseMove {
                cursor = (event.data1 as i32, (event.data2 & 0x00FF_FFFF) as i32);
            }
            match router.route(event, &mut wm, &mut shutdown) {
                RouterCommand::PowerOff => {
                    klog_info!("power-off requested, shutting down");
                    unsafe { crate::arch::power::shutdown() };
                }
                RouterCommand::DumpState => {
                    klog_info!(
                        "state dump: {} windows, focused={:?}",
                        wm.windows_back_to_front().len(),
                        wm.focused_id()
                    );
                }
                RouterCommand::ToggleDebugOverlay | RouterCommand::None => {}
            }
            if shutdown.tick(&mut wm) == ShutdownEvent::PowerOff {
                unsafe { crate::arch::power::shutdown() };
            }
        }

        if let Some(vesa) = vesa.as_mut() {
            render_frame(vesa, &wm, &shutdown, cursor);
        }

        crate::arch::cpu::halt();
    }
}


