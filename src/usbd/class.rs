//! usb-device class drivers for the active mode
//!
//! The descriptor-dispatch half of the mode manager: a single HID class
//! parameterized by the active mode's report descriptor covers every
//! HID-style identity, and the XInput vendor class substitutes for it when
//! the mode asks for it (class-driver substitution from the mode contract).
//! Which one is instantiated is decided once at bring-up; a mode change
//! reboots, so descriptors never change on a live device.

use heapless::Vec;
use usb_device::class_prelude::{
    ControlIn, ControlOut, InterfaceNumber, StringIndex, UsbBus, UsbBusAllocator, UsbClass,
};
use usb_device::control::{Recipient, RequestType};
use usb_device::descriptor::DescriptorWriter;
use usb_device::device::{UsbDevice, UsbDeviceState};
use usb_device::endpoint::{EndpointAddress, EndpointIn, EndpointOut};
use usb_device::LangID;

use super::mode::ClassKind;
use super::{OutReport, UsbdIo, MAX_REPORT};

const DESCRIPTOR_TYPE_HID: u8 = 0x21;
const DESCRIPTOR_TYPE_REPORT: u8 = 0x22;

const HID_REQ_GET_REPORT: u8 = 0x01;
const HID_REQ_GET_IDLE: u8 = 0x02;
const HID_REQ_GET_PROTOCOL: u8 = 0x03;
const HID_REQ_SET_REPORT: u8 = 0x09;
const HID_REQ_SET_IDLE: u8 = 0x0a;
const HID_REQ_SET_PROTOCOL: u8 = 0x0b;

/// HID class serving the active mode's report descriptor
pub struct HidModeClass<'a, B: UsbBus> {
    interface: InterfaceNumber,
    in_ep: EndpointIn<'a, B>,
    out_ep: Option<EndpointOut<'a, B>>,
    report_descriptor: &'static [u8],
    /// Answer to GET_REPORT(Input): the last report that went on the wire
    last_report: Vec<u8, MAX_REPORT>,
    /// Latest-wins mailbox of host-to-device reports
    out_report: Option<OutReport>,
    idle_rate: u8,
}

impl<'a, B: UsbBus> HidModeClass<'a, B> {
    pub fn new(
        alloc: &'a UsbBusAllocator<B>,
        report_descriptor: &'static [u8],
        out_endpoint: bool,
    ) -> Self {
        Self {
            interface: alloc.interface(),
            in_ep: alloc.interrupt(64, 1),
            out_ep: out_endpoint.then(|| alloc.interrupt(64, 1)),
            report_descriptor,
            last_report: Vec::new(),
            out_report: None,
            idle_rate: 0,
        }
    }

    fn hid_descriptor_body(&self) -> [u8; 7] {
        let len = self.report_descriptor.len() as u16;
        [
            0x11,
            0x01, // bcdHID 1.11
            0x00, // country code
            0x01, // one descriptor
            DESCRIPTOR_TYPE_REPORT,
            len as u8,
            (len >> 8) as u8,
        ]
    }

    fn write_report(&mut self, data: &[u8]) -> bool {
        match self.in_ep.write(data) {
            Ok(_) => {
                self.last_report.clear();
                self.last_report.extend_from_slice(data).ok();
                true
            }
            // Mostly WouldBlock: the host has not polled the previous report
            Err(_) => false,
        }
    }

    fn queue_out(&mut self, report_id: u8, data: &[u8]) {
        let mut buf = Vec::new();
        if buf.extend_from_slice(data).is_ok() {
            self.out_report = Some(OutReport {
                report_id,
                data: buf,
            });
        }
    }
}

impl<B: UsbBus> UsbClass<B> for HidModeClass<'_, B> {
    fn get_configuration_descriptors(
        &self,
        writer: &mut DescriptorWriter,
    ) -> usb_device::Result<()> {
        writer.interface(self.interface, 0x03, 0x00, 0x00)?;
        writer.write(DESCRIPTOR_TYPE_HID, &self.hid_descriptor_body())?;
        writer.endpoint(&self.in_ep)?;
        if let Some(out_ep) = &self.out_ep {
            writer.endpoint(out_ep)?;
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.last_report.clear();
        self.out_report = None;
    }

    fn control_in(&mut self, xfer: ControlIn<B>) {
        let (request_type, request, value, index) = {
            let req = xfer.request();
            (req.request_type, req.request, req.value, req.index)
        };
        if index != u8::from(self.interface) as u16 {
            return;
        }
        match (request_type, request) {
            (RequestType::Standard, usb_device::control::Request::GET_DESCRIPTOR) => {
                match (value >> 8) as u8 {
                    DESCRIPTOR_TYPE_REPORT => {
                        xfer.accept_with_static(self.report_descriptor).ok();
                    }
                    DESCRIPTOR_TYPE_HID => {
                        let body = self.hid_descriptor_body();
                        xfer.accept(|buf| {
                            buf[0] = 2 + body.len() as u8;
                            buf[1] = DESCRIPTOR_TYPE_HID;
                            buf[2..2 + body.len()].copy_from_slice(&body);
                            Ok(2 + body.len())
                        })
                        .ok();
                    }
                    _ => {}
                }
            }
            (RequestType::Class, HID_REQ_GET_REPORT) => {
                // Serve the last input report; feature blobs are the business
                // of externally plugged mode class drivers
                let report = &self.last_report;
                if report.is_empty() {
                    xfer.reject().ok();
                } else {
                    xfer.accept(|buf| {
                        buf[..report.len()].copy_from_slice(report);
                        Ok(report.len())
                    })
                    .ok();
                }
            }
            (RequestType::Class, HID_REQ_GET_IDLE) => {
                let idle = self.idle_rate;
                xfer.accept(|buf| {
                    buf[0] = idle;
                    Ok(1)
                })
                .ok();
            }
            (RequestType::Class, HID_REQ_GET_PROTOCOL) => {
                xfer.accept(|buf| {
                    buf[0] = 1; // report protocol
                    Ok(1)
                })
                .ok();
            }
            _ => {}
        }
    }

    fn control_out(&mut self, xfer: ControlOut<B>) {
        let (request_type, recipient, request, value, index) = {
            let req = xfer.request();
            (
                req.request_type,
                req.recipient,
                req.request,
                req.value,
                req.index,
            )
        };
        if request_type != RequestType::Class
            || recipient != Recipient::Interface
            || index != u8::from(self.interface) as u16
        {
            return;
        }
        match request {
            HID_REQ_SET_REPORT => {
                self.queue_out((value & 0xff) as u8, xfer.data());
                xfer.accept().ok();
            }
            HID_REQ_SET_IDLE => {
                self.idle_rate = (value >> 8) as u8;
                xfer.accept().ok();
            }
            HID_REQ_SET_PROTOCOL => {
                xfer.accept().ok();
            }
            _ => {}
        }
    }

    fn endpoint_out(&mut self, addr: EndpointAddress) {
        let Some(out_ep) = &self.out_ep else { return };
        if out_ep.address() != addr {
            return;
        }
        let mut buf = [0u8; MAX_REPORT];
        if let Ok(len) = out_ep.read(&mut buf) {
            // Interrupt-out data carries no report id of its own
            self.queue_out(0, &buf[..len]);
        }
    }
}

/// MS OS 1.0 string descriptor content: "MSFT100" + vendor code
const MS_OS_STRING: &str = "MSFT100\u{01}";
const MS_VENDOR_CODE: u8 = 0x01;

/// MS OS 1.0 extended compat id: one interface, compatible id "XUSB10"
#[rustfmt::skip]
const XUSB_COMPAT_ID: [u8; 40] = [
    0x28, 0x00, 0x00, 0x00, // dwLength
    0x00, 0x01,             // bcdVersion 1.00
    0x04, 0x00,             // wIndex: extended compat ID
    0x01,                   // bCount
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00,                   // bFirstInterfaceNumber
    0x01,                   // reserved
    b'X', b'U', b'S', b'B', b'1', b'0', 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// Xbox 360 vendor class driver
pub struct XInputClass<'a, B: UsbBus> {
    interface: InterfaceNumber,
    in_ep: EndpointIn<'a, B>,
    out_ep: EndpointOut<'a, B>,
    out_report: Option<OutReport>,
}

impl<'a, B: UsbBus> XInputClass<'a, B> {
    pub fn new(alloc: &'a UsbBusAllocator<B>) -> Self {
        Self {
            interface: alloc.interface(),
            in_ep: alloc.interrupt(32, 1),
            out_ep: alloc.interrupt(32, 8),
            out_report: None,
        }
    }

    fn write_report(&mut self, data: &[u8]) -> bool {
        self.in_ep.write(data).is_ok()
    }
}

impl<B: UsbBus> UsbClass<B> for XInputClass<'_, B> {
    fn get_configuration_descriptors(
        &self,
        writer: &mut DescriptorWriter,
    ) -> usb_device::Result<()> {
        writer.interface(self.interface, 0xff, 0x5d, 0x01)?;
        // The undocumented XInput interface descriptor; it embeds both
        // endpoint addresses
        let if_data = [
            0x10,
            0x01,
            0x01,
            0x25,
            self.in_ep.address().into(),
            0x14,
            0x00,
            0x00,
            0x00,
            0x00,
            0x13,
            self.out_ep.address().into(),
            0x08,
            0x00,
            0x00,
        ];
        writer.write(0x21, &if_data)?;
        writer.endpoint(&self.in_ep)?;
        writer.endpoint(&self.out_ep)?;
        Ok(())
    }

    fn get_string(&self, index: StringIndex, _lang_id: LangID) -> Option<&str> {
        // Windows probes string index 0xee for the MS OS descriptor hook
        (u8::from(index) == 0xee).then_some(MS_OS_STRING)
    }

    fn reset(&mut self) {
        self.out_report = None;
    }

    fn control_in(&mut self, xfer: ControlIn<B>) {
        let (request_type, request, index) = {
            let req = xfer.request();
            (req.request_type, req.request, req.index)
        };
        if request_type == RequestType::Vendor && request == MS_VENDOR_CODE && index == 0x0004 {
            xfer.accept_with_static(&XUSB_COMPAT_ID).ok();
        }
    }

    fn endpoint_out(&mut self, addr: EndpointAddress) {
        if self.out_ep.address() != addr {
            return;
        }
        let mut buf = [0u8; MAX_REPORT];
        if let Ok(len) = self.out_ep.read(&mut buf) {
            let mut data = Vec::new();
            if data.extend_from_slice(&buf[..len]).is_ok() {
                self.out_report = Some(OutReport {
                    report_id: 0,
                    data,
                });
            }
        }
    }
}

/// The class driver actually bound to the device, picked by the mode
pub enum ModeClass<'a, B: UsbBus> {
    Hid(HidModeClass<'a, B>),
    Vendor(XInputClass<'a, B>),
}

impl<'a, B: UsbBus> ModeClass<'a, B> {
    /// Instantiate the class driver a mode asks for
    pub fn new(
        alloc: &'a UsbBusAllocator<B>,
        kind: ClassKind,
        report_descriptor: &'static [u8],
    ) -> Self {
        match kind {
            ClassKind::Hid { out_endpoint } => {
                ModeClass::Hid(HidModeClass::new(alloc, report_descriptor, out_endpoint))
            }
            ClassKind::XInputVendor => ModeClass::Vendor(XInputClass::new(alloc)),
        }
    }

    pub fn write_report(&mut self, data: &[u8]) -> bool {
        match self {
            ModeClass::Hid(class) => class.write_report(data),
            ModeClass::Vendor(class) => class.write_report(data),
        }
    }

    pub fn take_output(&mut self) -> Option<OutReport> {
        match self {
            ModeClass::Hid(class) => class.out_report.take(),
            ModeClass::Vendor(class) => class.out_report.take(),
        }
    }
}

impl<B: UsbBus> UsbClass<B> for ModeClass<'_, B> {
    fn get_configuration_descriptors(
        &self,
        writer: &mut DescriptorWriter,
    ) -> usb_device::Result<()> {
        match self {
            ModeClass::Hid(class) => class.get_configuration_descriptors(writer),
            ModeClass::Vendor(class) => class.get_configuration_descriptors(writer),
        }
    }

    fn get_string(&self, index: StringIndex, lang_id: LangID) -> Option<&str> {
        match self {
            ModeClass::Hid(class) => class.get_string(index, lang_id),
            ModeClass::Vendor(class) => class.get_string(index, lang_id),
        }
    }

    fn reset(&mut self) {
        match self {
            ModeClass::Hid(class) => class.reset(),
            ModeClass::Vendor(class) => class.reset(),
        }
    }

    fn control_in(&mut self, xfer: ControlIn<B>) {
        match self {
            ModeClass::Hid(class) => class.control_in(xfer),
            ModeClass::Vendor(class) => class.control_in(xfer),
        }
    }

    fn control_out(&mut self, xfer: ControlOut<B>) {
        match self {
            ModeClass::Hid(class) => class.control_out(xfer),
            ModeClass::Vendor(class) => class.control_out(xfer),
        }
    }

    fn endpoint_out(&mut self, addr: EndpointAddress) {
        match self {
            ModeClass::Hid(class) => class.endpoint_out(addr),
            ModeClass::Vendor(class) => class.endpoint_out(addr),
        }
    }
}

/// [`UsbdIo`] over a live usb-device stack
pub struct UsbDeviceIo<'a, B: UsbBus> {
    pub dev: UsbDevice<'a, B>,
    pub class: ModeClass<'a, B>,
}

impl<B: UsbBus> UsbdIo for UsbDeviceIo<'_, B> {
    fn pump(&mut self) -> bool {
        self.dev.poll(&mut [&mut self.class])
    }

    fn ready(&self) -> bool {
        self.dev.state() == UsbDeviceState::Configured
    }

    fn write_report(&mut self, data: &[u8]) -> bool {
        self.class.write_report(data)
    }

    fn poll_output(&mut self, handle: &mut dyn FnMut(u8, &[u8])) {
        while let Some(report) = self.class.take_output() {
            handle(report.report_id, &report.data);
        }
    }
}
