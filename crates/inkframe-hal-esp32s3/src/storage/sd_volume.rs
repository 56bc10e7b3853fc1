//! Root directory file store on an SPI SD card.
//!
//! The mux may hand the card to the host between any two operations, so no
//! card or volume state is cached. Each operation preclocks the bus, probes
//! the card, mounts volume 0 and closes everything again.

use embedded_hal::{
    delay::DelayNs,
    digital::OutputPin,
    spi::{Error as SpiErrorTrait, ErrorKind, ErrorType, Operation, SpiBus, SpiDevice},
};
use embedded_sdmmc::{
    Mode, SdCard, SdCardError, ShortFileName, TimeSource, Timestamp, VolumeIdx, VolumeManager,
};
use heapless::String;
use inkframe_core::storage::{Capacity, FILE_NAME_BYTES, FileStore, StorageError};
use log::{debug, warn};

const SECTOR_BYTES: u32 = 512;

/// Fixed timestamp source used until RTC time integration is added.
#[derive(Clone, Copy, Debug, Default)]
pub struct FixedTimeSource;

impl TimeSource for FixedTimeSource {
    fn get_timestamp(&self) -> Timestamp {
        // 2026-01-01 00:00:00
        Timestamp {
            year_since_1970: 56,
            zero_indexed_month: 0,
            zero_indexed_day: 0,
            hours: 0,
            minutes: 0,
            seconds: 0,
        }
    }
}

#[derive(Debug)]
enum SdIoError<BusErr, CsErr>
where
    BusErr: core::fmt::Debug,
    CsErr: core::fmt::Debug,
{
    ChipSelect(CsErr),
    Spi(BusErr),
    Card(SdCardError),
    Filesystem(embedded_sdmmc::Error<SdCardError>),
    Released,
}

impl<BusErr, CsErr> SdIoError<BusErr, CsErr>
where
    BusErr: core::fmt::Debug,
    CsErr: core::fmt::Debug,
{
    fn into_storage(self, op: &str, name: &str) -> StorageError {
        match self {
            Self::Filesystem(embedded_sdmmc::Error::NotFound)
            | Self::Filesystem(embedded_sdmmc::Error::FilenameError(_)) => StorageError::NotFound,
            other => {
                warn!("storage: {} failed name={} err={:?}", op, name, other);
                StorageError::Io
            }
        }
    }
}

#[derive(Debug)]
enum ExclusiveSpiError<BusErr, CsErr>
where
    BusErr: core::fmt::Debug,
    CsErr: core::fmt::Debug,
{
    Bus(BusErr),
    Cs(CsErr),
    DelayNotSupported,
}

impl<BusErr, CsErr> SpiErrorTrait for ExclusiveSpiError<BusErr, CsErr>
where
    BusErr: core::fmt::Debug,
    CsErr: core::fmt::Debug,
{
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

/// Borrowed bus plus chip select acting as the card's only SPI device.
struct ExclusiveSpiDevice<'a, BUS, CS> {
    bus: &'a mut BUS,
    cs: &'a mut CS,
}

impl<BUS, CS> ErrorType for ExclusiveSpiDevice<'_, BUS, CS>
where
    BUS: SpiBus<u8>,
    CS: OutputPin,
    BUS::Error: core::fmt::Debug,
    CS::Error: core::fmt::Debug,
{
    type Error = ExclusiveSpiError<BUS::Error, CS::Error>;
}

impl<BUS, CS> SpiDevice<u8> for ExclusiveSpiDevice<'_, BUS, CS>
where
    BUS: SpiBus<u8>,
    CS: OutputPin,
    BUS::Error: core::fmt::Debug,
    CS::Error: core::fmt::Debug,
{
    fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), Self::Error> {
        if operations
            .iter()
            .any(|op| matches!(op, Operation::DelayNs(_)))
        {
            return Err(ExclusiveSpiError::DelayNotSupported);
        }

        self.cs.set_low().map_err(ExclusiveSpiError::Cs)?;

        let op_result = (|| {
            for operation in operations {
                match operation {
                    Operation::Read(buf) => self.bus.read(buf).map_err(ExclusiveSpiError::Bus)?,
                    Operation::Write(buf) => self.bus.write(buf).map_err(ExclusiveSpiError::Bus)?,
                    Operation::Transfer(read, write) => self
                        .bus
                        .transfer(read, write)
                        .map_err(ExclusiveSpiError::Bus)?,
                    Operation::TransferInPlace(buf) => self
                        .bus
                        .transfer_in_place(buf)
                        .map_err(ExclusiveSpiError::Bus)?,
                    Operation::DelayNs(_) => return Err(ExclusiveSpiError::DelayNotSupported),
                }
            }
            self.bus.flush().map_err(ExclusiveSpiError::Bus)
        })();

        let cs_result = self.cs.set_high().map_err(ExclusiveSpiError::Cs);
        op_result.and(cs_result)
    }
}

struct DelayRef<'a, D>(&'a mut D);

impl<D> DelayNs for DelayRef<'_, D>
where
    D: DelayNs,
{
    fn delay_ns(&mut self, ns: u32) {
        self.0.delay_ns(ns);
    }
}

type Card<'a, BUS, CS, DELAY> = SdCard<ExclusiveSpiDevice<'a, BUS, CS>, DelayRef<'a, DELAY>>;

/// SD card on a dedicated SPI bus, seen as a flat root directory.
pub struct SdVolume<BUS, CS, DELAY> {
    bus: BUS,
    cs: CS,
    delay: DELAY,
    released: bool,
}

impl<BUS, CS, DELAY> SdVolume<BUS, CS, DELAY>
where
    BUS: SpiBus<u8>,
    CS: OutputPin,
    DELAY: DelayNs,
    BUS::Error: core::fmt::Debug,
    CS::Error: core::fmt::Debug,
{
    pub fn new(bus: BUS, cs: CS, delay: DELAY) -> Self {
        Self {
            bus,
            cs,
            delay,
            released: false,
        }
    }

    fn probe(&mut self) -> Result<(Card<'_, BUS, CS, DELAY>, u64), SdIoError<BUS::Error, CS::Error>> {
        if self.released {
            return Err(SdIoError::Released);
        }

        self.cs.set_high().map_err(SdIoError::ChipSelect)?;

        // SD SPI init requires >=74 clock cycles with CS deasserted.
        let preclock = [0xFFu8; 10];
        self.bus.write(&preclock).map_err(SdIoError::Spi)?;

        let spi_device = ExclusiveSpiDevice {
            bus: &mut self.bus,
            cs: &mut self.cs,
        };
        let sd_card = SdCard::new(spi_device, DelayRef(&mut self.delay));
        let card_size_bytes = sd_card.num_bytes().map_err(SdIoError::Card)?;
        Ok((sd_card, card_size_bytes))
    }

    fn list(&mut self, visit: &mut dyn FnMut(&str)) -> Result<(), SdIoError<BUS::Error, CS::Error>> {
        let (sd_card, _) = self.probe()?;
        let volume_mgr = VolumeManager::new(sd_card, FixedTimeSource);
        let mut volume = volume_mgr
            .open_volume(VolumeIdx(0))
            .map_err(SdIoError::Filesystem)?;
        let mut root_dir = volume.open_root_dir().map_err(SdIoError::Filesystem)?;

        root_dir
            .iterate_dir(|entry| {
                if entry.attributes.is_directory() || entry.attributes.is_volume() {
                    return;
                }
                let name = short_file_name_to_string::<FILE_NAME_BYTES>(&entry.name);
                visit(name.as_str());
            })
            .map_err(SdIoError::Filesystem)?;

        root_dir.close().map_err(SdIoError::Filesystem)?;
        volume.close().map_err(SdIoError::Filesystem)?;
        Ok(())
    }

    fn length(&mut self, name: &str) -> Result<usize, SdIoError<BUS::Error, CS::Error>> {
        let (sd_card, _) = self.probe()?;
        let volume_mgr = VolumeManager::new(sd_card, FixedTimeSource);
        let mut volume = volume_mgr
            .open_volume(VolumeIdx(0))
            .map_err(SdIoError::Filesystem)?;
        let mut root_dir = volume.open_root_dir().map_err(SdIoError::Filesystem)?;
        let mut file = root_dir
            .open_file_in_dir(name, Mode::ReadOnly)
            .map_err(SdIoError::Filesystem)?;

        let len = file.length() as usize;

        file.close().map_err(SdIoError::Filesystem)?;
        root_dir.close().map_err(SdIoError::Filesystem)?;
        volume.close().map_err(SdIoError::Filesystem)?;
        Ok(len)
    }

    fn read_into(
        &mut self,
        name: &str,
        out: &mut [u8],
    ) -> Result<usize, SdIoError<BUS::Error, CS::Error>> {
        let (sd_card, _) = self.probe()?;
        let volume_mgr = VolumeManager::new(sd_card, FixedTimeSource);
        let mut volume = volume_mgr
            .open_volume(VolumeIdx(0))
            .map_err(SdIoError::Filesystem)?;
        let mut root_dir = volume.open_root_dir().map_err(SdIoError::Filesystem)?;
        let mut file = root_dir
            .open_file_in_dir(name, Mode::ReadOnly)
            .map_err(SdIoError::Filesystem)?;

        let mut total = 0usize;
        while total < out.len() && !file.is_eof() {
            let read_now = file
                .read(&mut out[total..])
                .map_err(SdIoError::Filesystem)?;
            if read_now == 0 {
                break;
            }
            total += read_now;
        }

        file.close().map_err(SdIoError::Filesystem)?;
        root_dir.close().map_err(SdIoError::Filesystem)?;
        volume.close().map_err(SdIoError::Filesystem)?;
        Ok(total)
    }

    fn create(
        &mut self,
        name: &str,
        contents: &[u8],
    ) -> Result<bool, SdIoError<BUS::Error, CS::Error>> {
        let (sd_card, _) = self.probe()?;
        let volume_mgr = VolumeManager::new(sd_card, FixedTimeSource);
        let mut volume = volume_mgr
            .open_volume(VolumeIdx(0))
            .map_err(SdIoError::Filesystem)?;
        let mut root_dir = volume.open_root_dir().map_err(SdIoError::Filesystem)?;

        let mut file = match root_dir.open_file_in_dir(name, Mode::ReadWriteCreate) {
            Ok(file) => file,
            Err(embedded_sdmmc::Error::FileAlreadyExists) => {
                root_dir.close().map_err(SdIoError::Filesystem)?;
                volume.close().map_err(SdIoError::Filesystem)?;
                return Ok(false);
            }
            Err(err) => return Err(SdIoError::Filesystem(err)),
        };

        file.write(contents).map_err(SdIoError::Filesystem)?;

        file.close().map_err(SdIoError::Filesystem)?;
        root_dir.close().map_err(SdIoError::Filesystem)?;
        volume.close().map_err(SdIoError::Filesystem)?;
        Ok(true)
    }
}

impl<BUS, CS, DELAY> FileStore for SdVolume<BUS, CS, DELAY>
where
    BUS: SpiBus<u8>,
    CS: OutputPin,
    DELAY: DelayNs,
    BUS::Error: core::fmt::Debug,
    CS::Error: core::fmt::Debug,
{
    fn list_root(&mut self, visit: &mut dyn FnMut(&str)) -> Result<(), StorageError> {
        self.list(visit)
            .map_err(|err| err.into_storage("list", "/"))
    }

    fn file_len(&mut self, name: &str) -> Result<usize, StorageError> {
        self.length(name)
            .map_err(|err| err.into_storage("stat", name))
    }

    fn read_file(&mut self, name: &str, out: &mut [u8]) -> Result<usize, StorageError> {
        let read = self
            .read_into(name, out)
            .map_err(|err| err.into_storage("read", name))?;
        debug!("storage: read name={} bytes={}", name, read);
        Ok(read)
    }

    fn create_if_absent(&mut self, name: &str, contents: &[u8]) -> Result<bool, StorageError> {
        self.create(name, contents)
            .map_err(|err| err.into_storage("create", name))
    }

    fn capacity(&mut self) -> Result<Capacity, StorageError> {
        let (_, card_size_bytes) = self
            .probe()
            .map_err(|err| err.into_storage("probe", "/"))?;
        Ok(Capacity {
            sector_count: card_size_bytes / SECTOR_BYTES as u64,
            sector_size: SECTOR_BYTES,
        })
    }

    fn release(&mut self) {
        let _ = self.cs.set_high();
        let _ = self.bus.flush();
        self.released = true;
    }
}

fn short_file_name_to_string<const NAME_BYTES: usize>(name: &ShortFileName) -> String<NAME_BYTES> {
    let mut out = String::new();

    for &byte in name.base_name() {
        if out.push(byte as char).is_err() {
            return out;
        }
    }

    let ext = name.extension();
    if !ext.is_empty() {
        let _ = out.push('.');
        for &byte in ext {
            if out.push(byte as char).is_err() {
                break;
            }
        }
    }

    out
}
